//! `--set-location LOC`: store coordinates from `lat,lon` or a ZIP.

use anyhow::{Result, bail};

use crate::config::{self, Paths};
use crate::zipdb;

pub fn run(paths: &Paths, spec: &str) -> Result<()> {
    if spec.contains(',') {
        let (lat, lon) = parse_lat_lon(spec)?;
        config::save_location(paths, lat, lon)?;
        println!("Location set to: {lat:.4}, {lon:.4}");
        return Ok(());
    }

    if spec.len() != 5 || !spec.chars().all(|c| c.is_ascii_digit()) {
        bail!("invalid ZIP code: must be 5 digits");
    }

    println!("Looking up ZIP code {spec}...");
    match zipdb::lookup(&paths.zipdb_file, spec) {
        Some((lat, lon)) => {
            println!("Found: {spec} -> {lat:.4}, {lon:.4}");
            config::save_location(paths, lat as f64, lon as f64)?;
            println!("Location set to: {lat:.4}, {lon:.4}");
            Ok(())
        }
        None => bail!("ZIP code {spec} not found in database"),
    }
}

fn parse_lat_lon(spec: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = spec.split(',').collect();
    if parts.len() != 2 {
        bail!("invalid format, use LAT,LON (e.g. 41.88,-87.63)");
    }
    let lat: f64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid latitude: {}", parts[0]))?;
    let lon: f64 = parts[1]
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid longitude: {}", parts[1]))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        bail!("coordinates out of range");
    }
    Ok((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lat_lon_roundtrip() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::in_dir(dir.path().to_path_buf());

        run(&paths, "41.88,-87.63").unwrap();
        let loc = config::load_location(&paths).expect("location saved");
        assert!((loc.lat - 41.88).abs() < 1e-6);
        assert!((loc.lon + 87.63).abs() < 1e-6);
    }

    #[test]
    fn rejects_malformed_input() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::in_dir(dir.path().to_path_buf());

        assert!(run(&paths, "1,2,3").is_err());
        assert!(run(&paths, "north,west").is_err());
        assert!(run(&paths, "95.0,10.0").is_err());
        assert!(run(&paths, "123").is_err());
        assert!(run(&paths, "1234a").is_err());
        assert!(config::load_location(&paths).is_none());
    }

    #[test]
    fn zip_missing_db_errors() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::in_dir(dir.path().to_path_buf());
        assert!(run(&paths, "60614").is_err());
    }
}

//! seccomp-bpf syscall allow-list.
//!
//! Once the event loop is running the daemon needs a small, fixed set
//! of syscalls: the wait primitive, file and memory ops, signal
//! handling, the child-spawn/reap path for the weather fetcher, and
//! the socket I/O the display-server connections use. Anything else
//! kills the process (`SECCOMP_RET_KILL_PROCESS`).
//!
//! Raw BPF, no libseccomp. The filter opens with an architecture check
//! so a foreign-arch syscall table cannot be confused for ours.

const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
const SECCOMP_MODE_FILTER: libc::c_int = 2;

const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;

// Offsets into struct seccomp_data
const OFFSET_NR: u32 = 0;
const OFFSET_ARCH: u32 = 4;

#[repr(C)]
struct SockFilter {
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
}

#[repr(C)]
struct SockFprog {
    len: u16,
    filter: *const SockFilter,
}

const fn stmt(code: u16, k: u32) -> SockFilter {
    SockFilter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> SockFilter {
    SockFilter { code, jt, jf, k }
}

/// x86_64 syscall numbers, from `asm/unistd_64.h`.
#[rustfmt::skip]
mod nr {
    pub const READ: u32 = 0;
    pub const WRITE: u32 = 1;
    pub const CLOSE: u32 = 3;
    pub const FSTAT: u32 = 5;
    pub const POLL: u32 = 7;
    pub const LSEEK: u32 = 8;
    pub const MMAP: u32 = 9;
    pub const MPROTECT: u32 = 10;
    pub const MUNMAP: u32 = 11;
    pub const BRK: u32 = 12;
    pub const RT_SIGACTION: u32 = 13;
    pub const RT_SIGPROCMASK: u32 = 14;
    pub const RT_SIGRETURN: u32 = 15;
    pub const IOCTL: u32 = 16;
    pub const PREAD64: u32 = 17;
    pub const WRITEV: u32 = 20;
    pub const ACCESS: u32 = 21;
    pub const SCHED_YIELD: u32 = 24;
    pub const MREMAP: u32 = 25;
    pub const MADVISE: u32 = 28;
    pub const DUP2: u32 = 33;
    pub const NANOSLEEP: u32 = 35;
    pub const GETPID: u32 = 39;
    pub const SOCKET: u32 = 41;
    pub const CONNECT: u32 = 42;
    pub const SENDTO: u32 = 44;
    pub const RECVFROM: u32 = 45;
    pub const SENDMSG: u32 = 46;
    pub const RECVMSG: u32 = 47;
    pub const SHUTDOWN: u32 = 48;
    pub const BIND: u32 = 49;
    pub const GETSOCKNAME: u32 = 51;
    pub const GETPEERNAME: u32 = 52;
    pub const SETSOCKOPT: u32 = 54;
    pub const GETSOCKOPT: u32 = 55;
    pub const CLONE: u32 = 56;
    pub const EXECVE: u32 = 59;
    pub const EXIT: u32 = 60;
    pub const WAIT4: u32 = 61;
    pub const KILL: u32 = 62;
    pub const UNAME: u32 = 63;
    pub const FCNTL: u32 = 72;
    pub const GETCWD: u32 = 79;
    pub const MKDIR: u32 = 83;
    pub const UNLINK: u32 = 87;
    pub const READLINK: u32 = 89;
    pub const GETTIMEOFDAY: u32 = 96;
    pub const GETUID: u32 = 102;
    pub const GETGID: u32 = 104;
    pub const GETEUID: u32 = 107;
    pub const GETEGID: u32 = 108;
    pub const SIGALTSTACK: u32 = 131;
    pub const PRCTL: u32 = 157;
    pub const ARCH_PRCTL: u32 = 158;
    pub const FUTEX: u32 = 202;
    pub const SCHED_GETAFFINITY: u32 = 204;
    pub const GETDENTS64: u32 = 217;
    pub const SET_TID_ADDRESS: u32 = 218;
    pub const CLOCK_GETTIME: u32 = 228;
    pub const CLOCK_NANOSLEEP: u32 = 230;
    pub const EXIT_GROUP: u32 = 231;
    pub const EPOLL_WAIT: u32 = 232;
    pub const EPOLL_CTL: u32 = 233;
    pub const INOTIFY_ADD_WATCH: u32 = 254;
    pub const OPENAT: u32 = 257;
    pub const MKDIRAT: u32 = 258;
    pub const NEWFSTATAT: u32 = 262;
    pub const UNLINKAT: u32 = 263;
    pub const READLINKAT: u32 = 267;
    pub const PPOLL: u32 = 271;
    pub const SET_ROBUST_LIST: u32 = 273;
    pub const EPOLL_PWAIT: u32 = 281;
    pub const SIGNALFD4: u32 = 289;
    pub const EVENTFD2: u32 = 290;
    pub const EPOLL_CREATE1: u32 = 291;
    pub const DUP3: u32 = 292;
    pub const PIPE2: u32 = 293;
    pub const INOTIFY_INIT1: u32 = 294;
    pub const RECVMMSG: u32 = 299;
    pub const PRLIMIT64: u32 = 302;
    pub const SENDMMSG: u32 = 307;
    pub const GETRANDOM: u32 = 318;
    pub const STATX: u32 = 332;
    pub const RSEQ: u32 = 334;
    pub const IO_URING_SETUP: u32 = 425;
    pub const IO_URING_ENTER: u32 = 426;
    pub const IO_URING_REGISTER: u32 = 427;
    pub const CLONE3: u32 = 435;
    pub const FACCESSAT2: u32 = 439;
}

/// Everything the steady-state loop, the backends, and the
/// child-spawn/reap path are allowed to call.
#[rustfmt::skip]
const ALLOWED: &[u32] = &[
    // Core I/O
    nr::READ, nr::WRITE, nr::OPENAT, nr::CLOSE, nr::FSTAT, nr::NEWFSTATAT,
    nr::LSEEK, nr::PREAD64, nr::WRITEV,
    // Memory
    nr::MMAP, nr::MUNMAP, nr::MPROTECT, nr::BRK, nr::MREMAP, nr::MADVISE,
    // Wait primitive
    nr::IO_URING_SETUP, nr::IO_URING_ENTER, nr::IO_URING_REGISTER,
    nr::POLL, nr::PPOLL,
    // Time
    nr::CLOCK_GETTIME, nr::CLOCK_NANOSLEEP, nr::NANOSLEEP, nr::GETTIMEOFDAY,
    // DRM gamma and fd configuration
    nr::IOCTL, nr::FCNTL,
    // Child spawn/reap for the weather fetcher
    nr::CLONE3, nr::CLONE, nr::EXECVE, nr::PIPE2, nr::DUP2, nr::DUP3,
    nr::WAIT4, nr::SET_ROBUST_LIST, nr::RSEQ, nr::PRLIMIT64, nr::ARCH_PRCTL,
    nr::SET_TID_ADDRESS,
    // Signals
    nr::RT_SIGPROCMASK, nr::RT_SIGACTION, nr::RT_SIGRETURN, nr::SIGALTSTACK,
    // File ops in the config directory
    nr::UNLINK, nr::UNLINKAT, nr::MKDIR, nr::MKDIRAT, nr::ACCESS,
    nr::FACCESSAT2, nr::GETCWD, nr::READLINK, nr::READLINKAT, nr::STATX,
    nr::GETRANDOM, nr::GETDENTS64,
    // Process info
    nr::GETPID, nr::GETUID, nr::GETEUID, nr::GETGID, nr::GETEGID, nr::KILL,
    nr::PRCTL, nr::FUTEX, nr::UNAME,
    // Exit
    nr::EXIT, nr::EXIT_GROUP,
    // Event fds
    nr::SIGNALFD4, nr::INOTIFY_INIT1, nr::INOTIFY_ADD_WATCH, nr::EVENTFD2,
    nr::EPOLL_CREATE1, nr::EPOLL_CTL, nr::EPOLL_WAIT, nr::EPOLL_PWAIT,
    // Socket I/O for display-server connections and the curl child
    nr::SOCKET, nr::CONNECT, nr::BIND, nr::SHUTDOWN, nr::SETSOCKOPT,
    nr::GETSOCKOPT, nr::GETSOCKNAME, nr::GETPEERNAME, nr::SENDTO,
    nr::SENDMSG, nr::SENDMMSG, nr::RECVFROM, nr::RECVMSG, nr::RECVMMSG,
    // Scheduler calls the allocator and runtime occasionally make
    nr::SCHED_YIELD, nr::SCHED_GETAFFINITY,
];

/// Build and install the filter. Returns false when the kernel refuses
/// it; the caller logs a warning and continues unfiltered.
pub fn install() -> bool {
    let mut prog: Vec<SockFilter> = Vec::with_capacity(ALLOWED.len() * 2 + 5);

    // Architecture check before anything else
    prog.push(stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH));
    prog.push(jump(BPF_JMP | BPF_JEQ | BPF_K, AUDIT_ARCH_X86_64, 1, 0));
    prog.push(stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));

    // Linear scan over the allow list: JEQ falls through to the next
    // check on mismatch, returns ALLOW on match
    prog.push(stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_NR));
    for &syscall in ALLOWED {
        prog.push(jump(BPF_JMP | BPF_JEQ | BPF_K, syscall, 0, 1));
        prog.push(stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
    }

    prog.push(stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));

    let fprog = SockFprog {
        len: prog.len() as u16,
        filter: prog.as_ptr(),
    };

    // Requires no_new_privs, set during process hardening
    unsafe {
        libc::prctl(
            libc::PR_SET_SECCOMP,
            SECCOMP_MODE_FILTER,
            &fprog as *const SockFprog,
        ) == 0
    }
}

/// Number of allowed syscalls, for the startup log line.
pub fn allowed_count() -> usize {
    ALLOWED.len()
}

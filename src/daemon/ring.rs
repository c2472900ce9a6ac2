//! Raw io_uring plumbing via `syscall(2)`.
//!
//! No liburing. The ring talks to the kernel through
//! `io_uring_setup`/`io_uring_enter` and three fixed mmap regions (SQ
//! ring, SQE array, CQ ring). Only the three opcodes the event loop
//! needs are wired up: POLL_ADD, TIMEOUT, and ASYNC_CANCEL.
//!
//! The shared head/tail indices are written by one side and read by
//! the other; acquire fences guard every read of the peer-written
//! index and release fences order our writes, per the io_uring
//! memory-bus protocol.

use std::io;
use std::sync::atomic::{Ordering, fence};

const NR_IO_URING_SETUP: libc::c_long = 425;
const NR_IO_URING_ENTER: libc::c_long = 426;

const IORING_OFF_SQ_RING: i64 = 0;
const IORING_OFF_CQ_RING: i64 = 0x8000000;
const IORING_OFF_SQES: i64 = 0x10000000;

const IORING_ENTER_GETEVENTS: u32 = 1;

const IORING_OP_POLL_ADD: u8 = 6;
const IORING_OP_TIMEOUT: u8 = 11;
const IORING_OP_ASYNC_CANCEL: u8 = 14;

/// Kernel `struct io_sqring_offsets`.
#[repr(C)]
#[derive(Default)]
struct SqringOffsets {
    head: u32,
    tail: u32,
    ring_mask: u32,
    ring_entries: u32,
    flags: u32,
    dropped: u32,
    array: u32,
    resv1: u32,
    user_addr: u64,
}

/// Kernel `struct io_cqring_offsets`.
#[repr(C)]
#[derive(Default)]
struct CqringOffsets {
    head: u32,
    tail: u32,
    ring_mask: u32,
    ring_entries: u32,
    overflow: u32,
    cqes: u32,
    flags: u32,
    resv1: u32,
    user_addr: u64,
}

/// Kernel `struct io_uring_params`.
#[repr(C)]
#[derive(Default)]
struct IoUringParams {
    sq_entries: u32,
    cq_entries: u32,
    flags: u32,
    sq_thread_cpu: u32,
    sq_thread_idle: u32,
    features: u32,
    wq_fd: u32,
    resv: [u32; 3],
    sq_off: SqringOffsets,
    cq_off: CqringOffsets,
}

/// Kernel `struct io_uring_sqe`, flat 64-byte layout.
#[repr(C)]
struct IoUringSqe {
    opcode: u8,
    flags: u8,
    ioprio: u16,
    fd: i32,
    off: u64,
    addr: u64,
    len: u32,
    rw_flags: u32,
    user_data: u64,
    buf_index: u16,
    personality: u16,
    splice_fd_in: i32,
    addr3: u64,
    _pad2: [u64; 1],
}

/// Kernel `struct io_uring_cqe`.
#[repr(C)]
pub struct IoUringCqe {
    pub user_data: u64,
    pub res: i32,
    pub flags: u32,
}

/// Kernel `struct __kernel_timespec`.
#[repr(C)]
pub struct KernelTimespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

const _: () = assert!(std::mem::size_of::<IoUringSqe>() == 64);
const _: () = assert!(std::mem::size_of::<IoUringCqe>() == 16);
const _: () = assert!(std::mem::size_of::<IoUringParams>() == 120);

/// A minimal submission/completion ring.
pub struct Ring {
    ring_fd: i32,

    sq_ring_ptr: *mut u8,
    sq_ring_size: usize,
    sq_head: *mut u32,
    sq_tail: *mut u32,
    sq_mask: *mut u32,
    sq_array: *mut u32,
    sq_entries: u32,
    sqes: *mut IoUringSqe,
    sqes_size: usize,

    cq_ring_ptr: *mut u8,
    cq_ring_size: usize,
    cq_head: *mut u32,
    cq_tail: *mut u32,
    cq_mask: *mut u32,
    cqes: *mut IoUringCqe,
}

impl Ring {
    /// `io_uring_setup` plus the three mmaps. Fails on kernels without
    /// io_uring (pre-5.1); the caller falls back to ppoll.
    pub fn new(entries: u32) -> io::Result<Self> {
        let mut params = IoUringParams::default();

        let fd =
            unsafe { libc::syscall(NR_IO_URING_SETUP, entries, &mut params as *mut IoUringParams) }
                as i32;
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let sq_ring_size =
            params.sq_off.array as usize + params.sq_entries as usize * std::mem::size_of::<u32>();
        let sq_ring_ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                sq_ring_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd,
                IORING_OFF_SQ_RING,
            )
        };
        if sq_ring_ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let sq = sq_ring_ptr as *mut u8;

        let sqes_size = params.sq_entries as usize * std::mem::size_of::<IoUringSqe>();
        let sqes_ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                sqes_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd,
                IORING_OFF_SQES,
            )
        };
        if sqes_ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe {
                libc::munmap(sq_ring_ptr, sq_ring_size);
                libc::close(fd);
            }
            return Err(err);
        }

        let cq_ring_size = params.cq_off.cqes as usize
            + params.cq_entries as usize * std::mem::size_of::<IoUringCqe>();
        let cq_ring_ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                cq_ring_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd,
                IORING_OFF_CQ_RING,
            )
        };
        if cq_ring_ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe {
                libc::munmap(sqes_ptr, sqes_size);
                libc::munmap(sq_ring_ptr, sq_ring_size);
                libc::close(fd);
            }
            return Err(err);
        }
        let cq = cq_ring_ptr as *mut u8;

        Ok(Ring {
            ring_fd: fd,
            sq_ring_ptr: sq,
            sq_ring_size,
            sq_head: unsafe { sq.add(params.sq_off.head as usize) as *mut u32 },
            sq_tail: unsafe { sq.add(params.sq_off.tail as usize) as *mut u32 },
            sq_mask: unsafe { sq.add(params.sq_off.ring_mask as usize) as *mut u32 },
            sq_array: unsafe { sq.add(params.sq_off.array as usize) as *mut u32 },
            sq_entries: params.sq_entries,
            sqes: sqes_ptr as *mut IoUringSqe,
            sqes_size,
            cq_ring_ptr: cq,
            cq_ring_size,
            cq_head: unsafe { cq.add(params.cq_off.head as usize) as *mut u32 },
            cq_tail: unsafe { cq.add(params.cq_off.tail as usize) as *mut u32 },
            cq_mask: unsafe { cq.add(params.cq_off.ring_mask as usize) as *mut u32 },
            cqes: unsafe { cq.add(params.cq_off.cqes as usize) as *mut IoUringCqe },
        })
    }

    /// Next SQE slot, zeroed, or `None` when the ring is full.
    fn get_sqe(&mut self) -> Option<*mut IoUringSqe> {
        unsafe {
            let tail = *self.sq_tail;
            fence(Ordering::Acquire);
            let head = *self.sq_head;

            if tail - head >= self.sq_entries {
                return None;
            }

            let idx = tail & *self.sq_mask;
            *self.sq_array.add(idx as usize) = idx;

            let sqe = self.sqes.add(idx as usize);
            std::ptr::write_bytes(sqe as *mut u8, 0, std::mem::size_of::<IoUringSqe>());
            Some(sqe)
        }
    }

    fn commit_sqe(&mut self) {
        fence(Ordering::Release);
        unsafe { *self.sq_tail += 1 };
    }

    /// Arm a one-shot POLLIN on `fd`, tagged with `user_data`.
    pub fn prep_poll(&mut self, fd: i32, user_data: u64) {
        if let Some(sqe) = self.get_sqe() {
            unsafe {
                (*sqe).opcode = IORING_OP_POLL_ADD;
                (*sqe).fd = fd;
                (*sqe).rw_flags = libc::POLLIN as u32;
                (*sqe).user_data = user_data;
            }
            self.commit_sqe();
        }
    }

    /// Arm a timeout. The timespec must stay alive until the matching
    /// `submit_and_wait` returns.
    pub fn prep_timeout(&mut self, ts: &KernelTimespec, user_data: u64) {
        if let Some(sqe) = self.get_sqe() {
            unsafe {
                (*sqe).opcode = IORING_OP_TIMEOUT;
                (*sqe).fd = -1;
                (*sqe).addr = ts as *const KernelTimespec as u64;
                (*sqe).len = 1;
                (*sqe).user_data = user_data;
            }
            self.commit_sqe();
        }
    }

    /// Cancel the pending op tagged `target_user_data`.
    pub fn prep_cancel(&mut self, target_user_data: u64, user_data: u64) {
        if let Some(sqe) = self.get_sqe() {
            unsafe {
                (*sqe).opcode = IORING_OP_ASYNC_CANCEL;
                (*sqe).fd = -1;
                (*sqe).addr = target_user_data;
                (*sqe).user_data = user_data;
            }
            self.commit_sqe();
        }
    }

    /// One `io_uring_enter`: submit everything queued and wait for at
    /// least one completion. EINTR reads as zero completions.
    pub fn submit_and_wait(&mut self) -> io::Result<u32> {
        unsafe {
            let tail = *self.sq_tail;
            fence(Ordering::Acquire);
            let head = *self.sq_head;

            let to_submit = tail - head;
            if to_submit == 0 {
                return Ok(0);
            }

            let ret = libc::syscall(
                NR_IO_URING_ENTER,
                self.ring_fd,
                to_submit,
                1u32,
                IORING_ENTER_GETEVENTS,
                std::ptr::null::<libc::c_void>(),
                0usize,
            ) as i32;

            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    return Ok(0);
                }
                return Err(err);
            }
            Ok(ret as u32)
        }
    }

    /// Look at the next completion without consuming it.
    pub fn peek_cqe(&self) -> Option<&IoUringCqe> {
        unsafe {
            let head = *self.cq_head;
            fence(Ordering::Acquire);
            let tail = *self.cq_tail;

            if head == tail {
                return None;
            }

            let idx = head & *self.cq_mask;
            Some(&*self.cqes.add(idx as usize))
        }
    }

    /// Consume the completion last returned by `peek_cqe`.
    pub fn cqe_seen(&mut self) {
        fence(Ordering::Release);
        unsafe { *self.cq_head += 1 };
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        unsafe {
            if !self.sqes.is_null() {
                libc::munmap(self.sqes as *mut libc::c_void, self.sqes_size);
            }
            if !self.sq_ring_ptr.is_null() {
                libc::munmap(self.sq_ring_ptr as *mut libc::c_void, self.sq_ring_size);
            }
            if !self.cq_ring_ptr.is_null() {
                libc::munmap(self.cq_ring_ptr as *mut libc::c_void, self.cq_ring_size);
            }
            if self.ring_fd >= 0 {
                libc::close(self.ring_fd);
            }
        }
    }
}

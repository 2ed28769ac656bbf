use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::io::FromRawFd;
use std::ptr;

use libc::{
	MAP_FAILED,
	MAP_SHARED,
	O_CLOEXEC,
	O_RDWR,
	O_SYNC,
	PROT_READ,
	PROT_WRITE,
	c_void,
	mmap,
	munmap,
	open,
};

/// Register block mapped from a device node; only volatile, aligned 32-bit
/// accesses.
#[derive(Debug)]
pub struct RegisterWindow {
	base: ptr::NonNull<u32>,
	len: usize,
}

impl Drop for RegisterWindow {
	fn drop(&mut self) {
		let res = unsafe { munmap(self.base.as_ptr() as *mut c_void, self.len) };
		if 0 != res {
			panic!("munmap failed: {}", io::Error::last_os_error());
		}
	}
}

impl RegisterWindow {
	fn register(&self, offset: usize) -> *mut u32 {
		assert!(offset & 3 == 0, "unaligned register offset 0x{:x}", offset);
		assert!(offset + 4 <= self.len, "register offset 0x{:x} outside window", offset);
		unsafe { self.base.as_ptr().add(offset / 4) }
	}

	pub fn read(&self, offset: usize) -> u32 {
		unsafe { ptr::read_volatile(self.register(offset)) }
	}

	pub fn write(&mut self, offset: usize, value: u32) {
		unsafe { ptr::write_volatile(self.register(offset), value) }
	}
}

// character devices report no size, the caller knows the block length
pub fn map_device(path: &str, len: usize) -> io::Result<RegisterWindow> {
	let path = CString::new(path)?;

	let fd = unsafe { open(path.as_ptr(), O_RDWR | O_CLOEXEC | O_SYNC) };
	if -1 == fd {
		return Err(io::Error::last_os_error());
	}
	// closes the fd when done; the mapping stays valid
	let _file = unsafe { fs::File::from_raw_fd(fd) };

	let area = unsafe { mmap(ptr::null_mut(), len, PROT_READ | PROT_WRITE, MAP_SHARED, fd, 0) };
	if area == MAP_FAILED {
		return Err(io::Error::last_os_error());
	}
	match ptr::NonNull::new(area as *mut u32) {
		None => panic!("mmap shouldn't return NULL ever"),
		Some(base) => Ok(RegisterWindow { base, len }),
	}
}

//! SDMMC1 block device: request channel front end and I/O task.
//!
//! The transfer cycle never touches the peripheral. [`SdmmcBlockDevice`]
//! turns each accepted transfer into a [`Request`] on a one-slot channel;
//! the I/O task that owns `embassy_stm32::sdmmc::Sdmmc` executes it block by
//! block and then settles it through [`SdmmcLink::finish`], which clears the
//! busy flag and sets exactly one of the completion or error flags.
//!
//! ```text
//! TransferCycle ──start_write/start_read/erase──▶ SdmmcBlockDevice
//!                                                      │ try_send
//!                                                      ▼
//!                                  Channel<Request, 1> (SdmmcLink)
//!                                                      │ receive
//!                                                      ▼
//!                    sdmmc_io_task (interrupt executor) or emulated MMC
//!                                                      │ finish
//!                                                      ▼
//!                            busy = false, then TransferFlags::{write, read, error}
//! ```
//!
//! The I/O task runs on a higher-priority interrupt executor, so the
//! controller's blocking ready-poll on the thread executor never starves it.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use platform::block_device::BLOCK_SIZE;
use platform::{BlockDevice, CardRegisters, DeviceStatus, TransferDirection, TransferFlags};

/// Requests the channel holds. One transfer is outstanding at a time.
pub const REQUEST_DEPTH: usize = 1;

/// Link shared by the front end and whichever back end serves it.
pub static LINK: SdmmcLink = SdmmcLink::new();

/// Errors the front end reports when refusing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdmmcError {
    /// A previous request has not been settled yet.
    Busy,
    /// The request channel is full.
    QueueFull,
    /// Buffer length is not `block_count` whole blocks.
    LengthMismatch {
        /// Blocks requested
        blocks: u32,
        /// Buffer length in bytes
        bytes: usize,
    },
    /// Empty or inverted erase range.
    EmptyRange,
}

impl fmt::Display for SdmmcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("sdmmc busy"),
            Self::QueueFull => f.write_str("sdmmc request queue full"),
            Self::LengthMismatch { blocks, bytes } => {
                write!(f, "{bytes} bytes is not {blocks} blocks")
            }
            Self::EmptyRange => f.write_str("empty erase range"),
        }
    }
}

/// Raw view of a transfer buffer carried inside a [`Request`].
///
/// Holds no borrow: the caller of `start_write`/`start_read` guarantees the
/// memory stays valid and untouched until the request is settled. Only a
/// buffer taken from `&mut [u8]` hands out mutable access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufPtr {
    ptr: *mut u8,
    len: usize,
    writable: bool,
}

// SAFETY: a BufPtr is only dereferenced by the single back end that received
// it, while the issuing side keeps its hands off the buffer (BlockDevice
// contract on start_write/start_read).
unsafe impl Send for BufPtr {}

impl BufPtr {
    /// Source of a write: the back end may only read through it.
    fn shared(data: &[u8]) -> Self {
        Self {
            ptr: data.as_ptr().cast_mut(),
            len: data.len(),
            writable: false,
        }
    }

    /// Destination of a read.
    fn exclusive(data: &mut [u8]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
            writable: true,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if the buffer came from `&mut [u8]`.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    fn offset_of(&self, index: u32) -> Option<usize> {
        let offset = usize::try_from(index).ok()?.checked_mul(BLOCK_SIZE)?;
        let end = offset.checked_add(BLOCK_SIZE)?;
        (end <= self.len).then_some(offset)
    }

    /// Start of block `index`, or `None` past the end.
    pub fn block_ptr(&self, index: u32) -> Option<*const u8> {
        let offset = self.offset_of(index)?;
        // SAFETY: offset + BLOCK_SIZE <= len, so the result stays inside the
        // allocation the pointer was taken from.
        Some(unsafe { self.ptr.add(offset) }.cast_const())
    }

    /// Start of block `index` for writing into, or `None` past the end or
    /// for a read-only buffer.
    pub fn block_mut_ptr(&self, index: u32) -> Option<*mut u8> {
        if !self.writable {
            return None;
        }
        let offset = self.offset_of(index)?;
        // SAFETY: as in block_ptr.
        Some(unsafe { self.ptr.add(offset) })
    }

    /// The whole buffer.
    ///
    /// # Safety
    /// The request carrying this pointer must still be outstanding.
    pub unsafe fn as_slice<'b>(&self) -> &'b [u8] {
        // SAFETY: forwarded to the caller.
        unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The whole buffer, mutably, or `None` for a read-only buffer.
    ///
    /// # Safety
    /// The request carrying this pointer must still be outstanding.
    pub unsafe fn as_mut_slice<'b>(&self) -> Option<&'b mut [u8]> {
        if !self.writable {
            return None;
        }
        // SAFETY: forwarded to the caller; the pointer came from `&mut [u8]`.
        Some(unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) })
    }
}

/// Work item for the I/O task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Program `block_count` blocks from `data` starting at `block_addr`.
    Write {
        /// Source buffer
        data: BufPtr,
        /// First block
        block_addr: u32,
        /// Blocks to write
        block_count: u32,
    },
    /// Read `block_count` blocks into `data` starting at `block_addr`.
    Read {
        /// Destination buffer
        data: BufPtr,
        /// First block
        block_addr: u32,
        /// Blocks to read
        block_count: u32,
    },
    /// Erase blocks `start_block..end_block`.
    Erase {
        /// First block
        start_block: u32,
        /// One past the last block
        end_block: u32,
    },
}

impl Request {
    /// Direction whose completion flag settles this request.
    pub const fn direction(&self) -> Option<TransferDirection> {
        match self {
            Self::Write { .. } => Some(TransferDirection::Write),
            Self::Read { .. } => Some(TransferDirection::Read),
            Self::Erase { .. } => None,
        }
    }

    /// Short name for logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::Erase { .. } => "erase",
        }
    }
}

/// Channel, busy flag and completion flags shared with the back end.
pub struct SdmmcLink {
    requests: Channel<CriticalSectionRawMutex, Request, REQUEST_DEPTH>,
    busy: AtomicBool,
    faulted: AtomicBool,
    flags: TransferFlags,
}

impl SdmmcLink {
    /// Idle link.
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            busy: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
            flags: TransferFlags::new(),
        }
    }

    /// Completion flags the back end signals.
    pub fn flags(&self) -> &TransferFlags {
        &self.flags
    }

    /// `true` while a request is queued or executing.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// `true` once any request has failed.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Wait for the next request.
    pub async fn next_request(&self) -> Request {
        self.requests.receive().await
    }

    /// Take a queued request without waiting.
    pub fn try_next_request(&self) -> Option<Request> {
        self.requests.try_receive().ok()
    }

    /// Settle `request`.
    ///
    /// Busy clears before the flag is set: a controller that observes the
    /// completion may poll status immediately and must see the device ready.
    pub fn finish(&self, request: &Request, succeeded: bool) {
        if !succeeded {
            self.faulted.store(true, Ordering::Release);
        }
        self.busy.store(false, Ordering::Release);
        match (succeeded, request.direction()) {
            (true, Some(direction)) => self.flags.complete(direction),
            (true, None) => {}
            (false, _) => self.flags.fail(),
        }
    }

    fn submit(&self, request: Request) -> Result<(), SdmmcError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(SdmmcError::Busy);
        }
        self.requests.try_send(request).map_err(|_| {
            self.busy.store(false, Ordering::Release);
            SdmmcError::QueueFull
        })
    }
}

impl Default for SdmmcLink {
    fn default() -> Self {
        Self::new()
    }
}

/// [`BlockDevice`] front end that forwards to the I/O task over a link.
pub struct SdmmcBlockDevice<'a> {
    link: &'a SdmmcLink,
    registers: Option<CardRegisters>,
}

impl<'a> SdmmcBlockDevice<'a> {
    /// Front end for `link`.
    pub fn new(link: &'a SdmmcLink) -> Self {
        Self {
            link,
            registers: None,
        }
    }

    /// Report `registers` from [`BlockDevice::card_registers`].
    pub fn with_registers(mut self, registers: CardRegisters) -> Self {
        self.registers = Some(registers);
        self
    }

    /// The link this device submits to.
    pub fn link(&self) -> &'a SdmmcLink {
        self.link
    }
}

fn check_length(len: usize, block_count: u32) -> Result<(), SdmmcError> {
    let expected = usize::try_from(block_count)
        .ok()
        .and_then(|n| n.checked_mul(BLOCK_SIZE));
    if block_count == 0 || expected != Some(len) {
        return Err(SdmmcError::LengthMismatch {
            blocks: block_count,
            bytes: len,
        });
    }
    Ok(())
}

impl BlockDevice for SdmmcBlockDevice<'_> {
    type Error = SdmmcError;

    fn status(&mut self) -> Result<DeviceStatus, SdmmcError> {
        Ok(if self.link.is_busy() {
            DeviceStatus::Busy
        } else if self.link.is_faulted() {
            DeviceStatus::Error
        } else {
            DeviceStatus::Ready
        })
    }

    unsafe fn start_write(
        &mut self,
        data: &[u8],
        block_addr: u32,
        block_count: u32,
    ) -> Result<(), SdmmcError> {
        check_length(data.len(), block_count)?;
        let data = BufPtr::shared(data);
        self.link.submit(Request::Write {
            data,
            block_addr,
            block_count,
        })
    }

    unsafe fn start_read(
        &mut self,
        data: &mut [u8],
        block_addr: u32,
        block_count: u32,
    ) -> Result<(), SdmmcError> {
        check_length(data.len(), block_count)?;
        let data = BufPtr::exclusive(data);
        self.link.submit(Request::Read {
            data,
            block_addr,
            block_count,
        })
    }

    fn erase(&mut self, start_block: u32, end_block: u32) -> Result<(), SdmmcError> {
        if end_block <= start_block {
            return Err(SdmmcError::EmptyRange);
        }
        self.link.submit(Request::Erase {
            start_block,
            end_block,
        })
    }

    fn card_registers(&mut self) -> Option<CardRegisters> {
        self.registers
    }
}

// ── Hardware I/O task ────────────────────────────────────────────────────────

#[cfg(feature = "hardware")]
pub mod task {
    //! The Embassy task that owns SDMMC1.

    use embassy_stm32::peripherals::SDMMC1;
    use embassy_stm32::sdmmc::{DataBlock, Error, Sdmmc};

    use super::{BufPtr, Request, SdmmcLink};

    #[derive(defmt::Format)]
    enum TaskError {
        Sdmmc(Error),
        /// Block index past the end of the request's buffer.
        OutOfBounds(u32),
        /// Read request carrying a write source.
        ReadOnly,
    }

    impl From<Error> for TaskError {
        fn from(err: Error) -> Self {
            Self::Sdmmc(err)
        }
    }

    /// Serve `link` forever.
    #[embassy_executor::task]
    pub async fn sdmmc_io_task(mut sdmmc: Sdmmc<'static, SDMMC1>, link: &'static SdmmcLink) {
        loop {
            let request = link.next_request().await;
            defmt::trace!("sdmmc {=str}", request.label());
            let outcome = execute(&mut sdmmc, &request).await;
            if let Err(err) = &outcome {
                defmt::error!("sdmmc {=str} failed: {}", request.label(), err);
            }
            link.finish(&request, outcome.is_ok());
        }
    }

    async fn execute(sdmmc: &mut Sdmmc<'static, SDMMC1>, request: &Request) -> Result<(), TaskError> {
        match *request {
            Request::Write {
                data,
                block_addr,
                block_count,
            } => {
                for i in 0..block_count {
                    let block = source_block(data, i)?;
                    sdmmc.write_block(block_addr.wrapping_add(i), block).await?;
                }
            }
            Request::Read {
                data,
                block_addr,
                block_count,
            } => {
                for i in 0..block_count {
                    let block = destination_block(data, i)?;
                    sdmmc.read_block(block_addr.wrapping_add(i), block).await?;
                }
            }
            Request::Erase {
                start_block,
                end_block,
            } => {
                // No erase command in this HAL; the first write overwrites the range.
                defmt::debug!("erase {=u32}..{=u32} acknowledged", start_block, end_block);
                sdmmc.card()?;
            }
        }
        Ok(())
    }

    fn source_block(data: BufPtr, index: u32) -> Result<&'static DataBlock, TaskError> {
        let ptr = data.block_ptr(index).ok_or(TaskError::OutOfBounds(index))?;
        // SAFETY: block_ptr bounds the block inside the buffer. Windows start
        // on 512-byte offsets of 32-byte-aligned DmaBuffers, which satisfies
        // DataBlock's 4-byte alignment. The buffer stays unmodified until
        // `finish` runs.
        Ok(unsafe { &*ptr.cast::<DataBlock>() })
    }

    fn destination_block(data: BufPtr, index: u32) -> Result<&'static mut DataBlock, TaskError> {
        if !data.is_writable() {
            return Err(TaskError::ReadOnly);
        }
        let ptr = data.block_mut_ptr(index).ok_or(TaskError::OutOfBounds(index))?;
        // SAFETY: as in source_block. The pointer came from `&mut [u8]` and
        // the issuing side does not touch the buffer until `finish` runs, so
        // this is the only live reference.
        Ok(unsafe { &mut *ptr.cast::<DataBlock>() })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_write_queues_one_request_and_goes_busy() {
        let link = SdmmcLink::new();
        let mut device = SdmmcBlockDevice::new(&link);
        let data = [0xA5u8; 1024];
        // SAFETY: the request is drained below before `data` goes away.
        unsafe { device.start_write(&data, 0x400, 2) }.unwrap();

        assert_eq!(device.status(), Ok(DeviceStatus::Busy));
        let request = link.try_next_request().unwrap();
        assert_eq!(request.direction(), Some(TransferDirection::Write));
        match request {
            Request::Write {
                data: buf,
                block_addr,
                block_count,
            } => {
                assert_eq!((block_addr, block_count, buf.len()), (0x400, 2, 1024));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_second_request_while_busy_is_rejected() {
        let link = SdmmcLink::new();
        let mut device = SdmmcBlockDevice::new(&link);
        let mut buf = [0u8; 512];
        // SAFETY: the requests are never executed.
        unsafe { device.start_read(&mut buf, 0, 1) }.unwrap();
        let again = unsafe { device.start_read(&mut buf, 0, 1) };
        assert_eq!(again, Err(SdmmcError::Busy));
    }

    #[test]
    fn test_finish_clears_busy_before_signaling() {
        let link = SdmmcLink::new();
        let mut device = SdmmcBlockDevice::new(&link);
        let mut buf = [0u8; 512];
        // SAFETY: the request is settled without touching the buffer.
        unsafe { device.start_read(&mut buf, 7, 1) }.unwrap();
        let request = link.try_next_request().unwrap();

        link.finish(&request, true);
        assert!(!link.is_busy());
        assert!(link.flags().read.take());
        assert!(!link.flags().error.is_set());
        assert_eq!(device.status(), Ok(DeviceStatus::Ready));
    }

    #[test]
    fn test_failed_request_raises_error_flag_and_status() {
        let link = SdmmcLink::new();
        let mut device = SdmmcBlockDevice::new(&link);
        device.erase(0x400, 0x401).unwrap();
        let request = link.try_next_request().unwrap();
        assert_eq!(request.label(), "erase");

        link.finish(&request, false);
        assert!(link.flags().error.is_set());
        assert_eq!(device.status(), Ok(DeviceStatus::Error));
    }

    #[test]
    fn test_length_must_be_whole_blocks() {
        let link = SdmmcLink::new();
        let mut device = SdmmcBlockDevice::new(&link);
        let data = [0u8; 700];
        // SAFETY: rejected before anything is queued.
        let result = unsafe { device.start_write(&data, 0, 2) };
        assert_eq!(
            result,
            Err(SdmmcError::LengthMismatch {
                blocks: 2,
                bytes: 700
            })
        );
        assert!(!link.is_busy());
        assert_eq!(device.erase(5, 5), Err(SdmmcError::EmptyRange));
    }

    #[test]
    fn test_block_ptr_stays_in_bounds() {
        let mut data = [0u8; 1024];
        let buf = BufPtr::exclusive(&mut data);
        let base = data.as_ptr() as usize;
        assert_eq!(buf.block_ptr(0).map(|p| p as usize), Some(base));
        assert_eq!(buf.block_ptr(1).map(|p| p as usize), Some(base + 512));
        assert_eq!(buf.block_ptr(2), None);
        assert_eq!(buf.block_ptr(u32::MAX), None);
        assert_eq!(buf.block_mut_ptr(1).map(|p| p as usize), Some(base + 512));
    }

    #[test]
    fn test_write_source_never_hands_out_mutable_access() {
        let link = SdmmcLink::new();
        let mut device = SdmmcBlockDevice::new(&link);
        let data = [0x5Au8; 1024];
        // SAFETY: the request is drained below before `data` goes away.
        unsafe { device.start_write(&data, 0x400, 2) }.unwrap();
        let Request::Write { data: buf, .. } = link.try_next_request().unwrap() else {
            panic!("expected a write request");
        };
        assert!(!buf.is_writable());
        assert_eq!(buf.block_mut_ptr(0), None);
        // SAFETY: the request is still outstanding.
        assert!(unsafe { buf.as_mut_slice() }.is_none());
        assert_eq!(buf.block_ptr(1).map(|p| p as usize), Some(data.as_ptr() as usize + 512));
        // SAFETY: as above.
        assert_eq!(unsafe { buf.as_slice() }, &data[..]);
    }

    #[test]
    fn test_errors_display() {
        assert_eq!(SdmmcError::Busy.to_string(), "sdmmc busy");
        assert_eq!(
            SdmmcError::LengthMismatch {
                blocks: 2,
                bytes: 700
            }
            .to_string(),
            "700 bytes is not 2 blocks"
        );
    }

    #[tokio::test]
    async fn test_async_back_end_receives_the_request() {
        static TASK_LINK: SdmmcLink = SdmmcLink::new();
        let server = tokio::spawn(async {
            let request = TASK_LINK.next_request().await;
            TASK_LINK.finish(&request, true);
        });
        let mut device = SdmmcBlockDevice::new(&TASK_LINK);
        let data = [1u8; 512];
        // SAFETY: `data` outlives the server task, which is awaited below.
        unsafe { device.start_write(&data, 3, 1) }.unwrap();
        server.await.unwrap();
        assert!(TASK_LINK.flags().write.take());
        assert!(!TASK_LINK.is_busy());
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The acquisition driver.
//
// One call runs a whole job: negotiate, enable, wait for readiness, then
// loop page-by-page through geometry capture, transfer, retry, and
// acknowledgement, and finally tear the UI back down. Cancellation — at
// enable or mid-transfer — is a normal outcome carrying the pages acquired
// so far. The UI disable is issued exactly once per job, on whichever path
// ends it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    AcquireOutcome, AcquireStatus, AcquiredPage, CapId, DataGroup, Destination, JobId,
    OnPageFail, PixelType, SourceState, TransferMechanism,
};

use crate::source::{EnableOutcome, Source, blank_info};
use crate::transfer::{PageTransfer, transfer_one_page};

/// Adjusts the device-proposed file name for each page of a file transfer.
pub type RenameHook = Box<dyn FnMut(&Path, u32) -> PathBuf + Send>;

/// Everything one acquisition needs. Built with the fluent methods and
/// consumed by [`Source::acquire`].
pub struct AcquireJob {
    pub id: JobId,
    pub mechanism: TransferMechanism,
    pub destination: Destination,
    /// Pages to acquire; -1 means everything the device has.
    pub max_pages: i32,
    pub pixel_type: Option<PixelType>,
    pub show_ui: bool,
    /// Keep the source open when the job ends (the default); clearing it
    /// closes the connection as the last step of a finished job.
    pub remain_open: bool,
    pub duplex: bool,
    /// Caller-chosen strip size for buffered transfers. Used exactly as
    /// given once validated against the device bounds.
    pub strip_buffer_size: Option<u32>,
    /// Override of the configured page-failure policy.
    pub on_fail: Option<OnPageFail>,
    /// Override of the configured retry bound.
    pub max_retries: Option<u32>,
    pub rename_hook: Option<RenameHook>,
}

impl AcquireJob {
    pub fn new(mechanism: TransferMechanism) -> Self {
        Self {
            id: JobId::new(),
            mechanism,
            destination: Destination::Memory,
            max_pages: -1,
            pixel_type: None,
            show_ui: false,
            remain_open: true,
            duplex: false,
            strip_buffer_size: None,
            on_fail: None,
            max_retries: None,
            rename_hook: None,
        }
    }

    pub fn pages(mut self, max_pages: i32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn pixel_type(mut self, pixel_type: PixelType) -> Self {
        self.pixel_type = Some(pixel_type);
        self
    }

    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn show_ui(mut self) -> Self {
        self.show_ui = true;
        self
    }

    pub fn close_when_done(mut self) -> Self {
        self.remain_open = false;
        self
    }

    pub fn duplex(mut self) -> Self {
        self.duplex = true;
        self
    }

    pub fn strip_buffer(mut self, bytes: u32) -> Self {
        self.strip_buffer_size = Some(bytes);
        self
    }

    pub fn on_fail(mut self, policy: OnPageFail) -> Self {
        self.on_fail = Some(policy);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn rename_with<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Path, u32) -> PathBuf + Send + 'static,
    {
        self.rename_hook = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for AcquireJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquireJob")
            .field("id", &self.id)
            .field("mechanism", &self.mechanism)
            .field("max_pages", &self.max_pages)
            .field("show_ui", &self.show_ui)
            .field("duplex", &self.duplex)
            .finish_non_exhaustive()
    }
}

/// Sentinel negotiated into the transfer counter for "all available".
const ALL_PAGES: u32 = 0xFFFF;

/// Polls of the pending counter while waiting for a needs-polling device.
const READY_POLLS: u32 = 50;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Source {
    /// Run one acquisition job to completion, cancellation, or termination.
    pub fn acquire(&mut self, mut job: AcquireJob) -> Result<AcquireOutcome> {
        self.ctx.check_thread(self.serial)?;
        if self.state != SourceState::Opened {
            return Err(ScanwerkError::Sequence {
                state: self.state,
                detail: "acquire requires an opened, idle source".into(),
            });
        }
        let audio = job.mechanism == TransferMechanism::AudioNative;
        if audio && !self.identity.supports_group(DataGroup::Audio) {
            return Err(ScanwerkError::Misuse(
                "source does not advertise the audio group".into(),
            ));
        }
        if job.mechanism == TransferMechanism::File
            && !matches!(job.destination, Destination::File { .. })
        {
            return Err(ScanwerkError::Misuse(
                "file transfer requires a file destination".into(),
            ));
        }

        self.forced_done = false;
        info!(job = %job.id, mechanism = ?job.mechanism, pages = job.max_pages, "acquire start");

        // -- Negotiation, while capability mutation is still legal --
        if let Some(pixel_type) = job.pixel_type {
            self.set_u32(CapId::PIXEL_TYPE, u32::from(pixel_type.as_raw()))?;
        }
        if !audio {
            self.set_u32(CapId::XFER_MECH, u32::from(job.mechanism.as_raw()))?;
            self.negotiate_page_count(&job)?;
        }

        // -- Enable --
        if self.enable_ui(job.show_ui)? == EnableOutcome::Cancelled {
            info!(job = %job.id, "cancelled at enable");
            return Ok(AcquireOutcome {
                job_id: job.id,
                status: AcquireStatus::Cancelled,
                pages: Vec::new(),
                sheets: 0,
            });
        }
        self.wait_transfer_ready()?;

        let max_retries = job.max_retries.unwrap_or(self.ctx.config().max_page_retries);
        let on_fail = job.on_fail.unwrap_or(self.ctx.config().on_page_fail);
        // Client-side bound in images: a duplex sheet is two of them.
        let wanted = if job.max_pages < 0 {
            u32::MAX
        } else if job.duplex {
            job.max_pages as u32 * 2
        } else {
            job.max_pages as u32
        };

        let mut pages: Vec<AcquiredPage> = Vec::new();
        let mut status = AcquireStatus::Completed;

        // -- Page loop --
        'job: while (pages.len() as u32) < wanted {
            if !audio && self.pending_count()? == 0 {
                break;
            }
            let info = if audio {
                blank_info()
            } else {
                match self.image_info() {
                    Ok(info) => info,
                    Err(err) => {
                        self.disable_ui();
                        return Err(err);
                    }
                }
            };
            if !audio {
                match self.image_layout() {
                    Ok(layout) => debug!(
                        page = pages.len(),
                        document = layout.document_number,
                        frame = ?layout.frame,
                        "layout captured"
                    ),
                    Err(err) => debug!(page = pages.len(), error = %err, "no layout"),
                }
            }

            let page_index = pages.len() as u32;
            let mut attempt = 0u32;
            let data = loop {
                attempt += 1;
                match transfer_one_page(self, &mut job, &info, page_index) {
                    Ok(PageTransfer::Done(data)) => break data,
                    Ok(PageTransfer::Cancelled) => {
                        self.disable_ui();
                        // A force-done device drops its end notification, so
                        // a cancel with pages in hand is the batch finishing.
                        status = if self.forced_done && !pages.is_empty() {
                            AcquireStatus::Completed
                        } else {
                            AcquireStatus::Cancelled
                        };
                        info!(job = %job.id, page = page_index, "cancelled mid-job");
                        break 'job;
                    }
                    Err(err) if !page_retriable(&err) => {
                        self.disable_ui();
                        return Err(err);
                    }
                    Err(err) if on_fail == OnPageFail::Retry && attempt <= max_retries => {
                        warn!(
                            job = %job.id,
                            page = page_index,
                            attempt,
                            error = %err,
                            "page failed, retrying"
                        );
                        self.retries_used += 1;
                        self.state = SourceState::TransferReady;
                    }
                    Err(err) => {
                        error!(
                            job = %job.id,
                            page = page_index,
                            attempt,
                            error = %err,
                            "page failed, terminating job"
                        );
                        self.abandon_pending();
                        status = AcquireStatus::Terminated;
                        break 'job;
                    }
                }
            };

            pages.push(AcquiredPage {
                index: page_index,
                data,
                info,
                attempts: attempt,
            });

            let pending = match self.end_transfer() {
                Ok(pending) => pending,
                Err(err) => {
                    self.disable_ui();
                    return Err(err);
                }
            };
            if pending == 0 || self.forced_done {
                break;
            }
        }

        if self.state > SourceState::Opened {
            self.disable_ui();
        }
        if !job.remain_open {
            if let Err(err) = self.close_internal(self.ctx.config().close_policy) {
                warn!(job = %job.id, error = %err, "close-when-done failed; source left open");
            }
        }
        let sheets = if job.duplex {
            (pages.len() as u32).div_ceil(2)
        } else {
            pages.len() as u32
        };
        info!(
            job = %job.id,
            status = ?status,
            pages = pages.len(),
            sheets,
            "acquire finished"
        );
        Ok(AcquireOutcome {
            job_id: job.id,
            status,
            pages,
            sheets,
        })
    }

    /// Negotiate how many transfers the device should deliver. Duplex
    /// prefers the sheet counter; a device without one counts each side as
    /// its own transfer, so the page count doubles.
    fn negotiate_page_count(&mut self, job: &AcquireJob) -> Result<()> {
        if job.duplex {
            self.set_u32(CapId::DUPLEX_ENABLED, 1)?;
            if job.max_pages < 0 {
                return self.set_u32(CapId::XFER_COUNT, ALL_PAGES);
            }
            let sheets = job.max_pages as u32;
            if self.is_supported(CapId::SHEET_COUNT, true)? {
                self.set_u32(CapId::SHEET_COUNT, sheets)?;
                self.set_u32(CapId::XFER_COUNT, ALL_PAGES)
            } else {
                self.set_u32(CapId::XFER_COUNT, sheets * 2)
            }
        } else if job.max_pages < 0 {
            self.set_u32(CapId::XFER_COUNT, ALL_PAGES)
        } else {
            self.set_u32(CapId::XFER_COUNT, job.max_pages as u32)
        }
    }

    /// Bridge the gap between UI enable and the first transfer. Quirky
    /// devices get an extra delay or a polling loop; everything else is
    /// ready immediately after enable.
    fn wait_transfer_ready(&mut self) -> Result<()> {
        if self.quirks.ready_delay {
            let delay = Duration::from_millis(self.ctx.config().ready_delay_ms);
            debug!(source = %self.identity.product_name, ?delay, "ready-delay quirk");
            std::thread::sleep(delay);
        }
        if self.quirks.needs_polling {
            for _ in 0..READY_POLLS {
                if self.pending_count()? != 0 {
                    break;
                }
                std::thread::sleep(READY_POLL_INTERVAL);
            }
        }
        self.state = SourceState::TransferReady;
        Ok(())
    }
}

/// Whether a page-transfer error may be answered with a retry. Device-side
/// failures are; caller bugs and fatal session errors are not.
fn page_retriable(err: &ScanwerkError) -> bool {
    matches!(
        err,
        ScanwerkError::Protocol { .. } | ScanwerkError::Transfer(_)
    )
}

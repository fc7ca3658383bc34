//! # Events Module
//!
//! Progress reporting for scans and batches.
//!
//! ## Design
//! The scanner and the batch coordinator emit events through a channel;
//! whoever drives them (the CLI's progress bars, a test) subscribes.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! // In a separate thread, listen for events
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         match event {
//!             Event::Scan(ScanEvent::Progress(p)) => println!("Found {} files", p.files_found),
//!             Event::Batch(BatchEvent::Progress(p)) => println!("{}/{}", p.completed, p.total),
//!             _ => {}
//!         }
//!     }
//! });
//!
//! let coordinator = coordinator.with_events(sender);
//! let hashed = coordinator.batch_hash(&paths);
//! ```

mod channel;
mod types;

pub use channel::{EventChannel, EventReceiver, EventSender, null_sender};
pub use types::*;

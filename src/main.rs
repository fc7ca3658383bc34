//! # photo-ingest CLI
//!
//! Command-line driver for the ingest core.
//!
//! ## Usage
//! ```bash
//! photo-ingest check /Volumes/CARD/DCIM --record
//! photo-ingest metadata IMG_0001.HEIC --output json
//! photo-ingest stats
//! photo-ingest cleanup --days 30
//! ```

mod cli;

use photo_ingest::Result;

fn main() -> Result<()> {
    cli::run()
}

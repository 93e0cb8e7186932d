use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use heliograph_core::io::ser::SerReader;

#[derive(Args)]
pub struct InfoArgs {
    /// Input SER file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = SerReader::open(&args.file)?;
    let header = &reader.header;

    println!("File:        {}", args.file.display());
    println!("Frames:      {}", header.frame_count);
    println!("Dimensions:  {}x{}", header.width, header.height);
    println!("Bit depth:   {}", header.pixel_depth);
    println!(
        "Byte order:  {}",
        if header.little_endian { "little-endian" } else { "big-endian" }
    );

    if !header.observer.is_empty() {
        println!("Observer:    {}", header.observer);
    }
    if !header.telescope.is_empty() {
        println!("Telescope:   {}", header.telescope);
    }
    if !header.instrument.is_empty() {
        println!("Instrument:  {}", header.instrument);
    }

    let frame_bytes = header.frame_byte_size();
    let total_mb = (frame_bytes * header.frame_count as usize) as f64 / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", total_mb);

    Ok(())
}

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use aseflat::{Config, Reader};
use clap::Parser as _;

#[derive(clap::Parser)]
struct Args {
    /// The frame to flatten, counting from 0.
    #[clap(long, short = 'f', default_value_t = 0)]
    frame: u32,

    /// Where to write the flattened frame as a PNG.
    ///
    /// If not specified, the file is only decoded.
    #[clap(long, short = 'o')]
    output: Option<PathBuf>,

    /// Only check whether the file looks like an Aseprite file.
    #[clap(long)]
    check: bool,

    /// Path to the Aseprite file.
    file: PathBuf,
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()
        .context("Error initializing logging")?;

    let args = Args::try_parse().context("Error parsing command line arguments")?;

    let mut file = BufReader::new(File::open(&args.file).context("Error opening file")?);
    let mut reader = Reader::with_config(Config::builder().frame(args.frame).build());

    if args.check {
        if !reader.can_open(&mut file) {
            anyhow::bail!("{} is not an Aseprite file", args.file.display());
        }
        log::info!("{} looks like an Aseprite file", args.file.display());
        return Ok(());
    }

    let raster = reader.open(file).context("Error decoding aseprite file")?;
    log::info!("frame {}: {}x{}", args.frame, raster.width(), raster.height());

    if let Some(output) = args.output {
        let (width, height) = (raster.width(), raster.height());
        let image = image::RgbaImage::from_raw(width, height, raster.into_pixels())
            .context("Raster does not match its dimensions")?;
        image.save(&output).with_context(|| format!("Error writing {}", output.display()))?;
        log::info!("wrote {}", output.display());
    }

    Ok(())
}

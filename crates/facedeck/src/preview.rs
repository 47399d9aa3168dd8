use std::fs;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use decksync::SyncSettings;
use image::ImageFormat;
use keyface::{
    ClockSource, Compositor, DecimalTime, Face, FixedClock, MediaHint, Rgba, SystemClock,
};

use crate::cli::{ClockArg, PreviewArgs};
use crate::paths::AppPaths;
use crate::run::load_config;

/// Renders one key face the way the engine would and writes it as PNG.
pub fn run_preview(args: PreviewArgs) -> Result<()> {
    if args.size == 0 {
        bail!("--size must be greater than zero");
    }
    let paths = AppPaths::discover()?;
    let config = load_config(&paths, args.config.as_deref())?;
    let settings = SyncSettings::from_config(&config)?;
    let compositor = Compositor::new(args.size, settings.clock_face);

    let buffer = match (args.clock, &args.image) {
        (Some(clock), _) => {
            let source: Box<dyn ClockSource> = match clock {
                ClockArg::Now => Box::new(SystemClock),
                ClockArg::At(millis) => Box::new(FixedClock::new(millis)),
            };
            let time = DecimalTime::now(source.as_ref());
            let fill = args.fill.unwrap_or(Rgba::BLACK);
            tracing::info!(%time, %fill, "rendering clock face");
            compositor.render(fill, Face::Clock { time })
        }
        (None, Some(path)) => {
            let fill = args.fill.unwrap_or(Rgba::TRANSPARENT);
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read image {}", path.display()))?;
            let hint = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(MediaHint::from_file_name)
                .unwrap_or_default();
            match keyface::decode(&bytes, hint) {
                Ok(image) => compositor.render(
                    fill,
                    Face::Image {
                        image: Some(&image),
                        elapsed: Duration::ZERO,
                    },
                ),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "image decode failed; rendering fill only");
                    compositor.render(
                        fill,
                        Face::Image {
                            image: None,
                            elapsed: Duration::ZERO,
                        },
                    )
                }
            }
        }
        (None, None) => compositor.render(
            args.fill.unwrap_or(Rgba::TRANSPARENT),
            Face::Image {
                image: None,
                elapsed: Duration::ZERO,
            },
        ),
    };

    let image = buffer
        .to_image()
        .ok_or_else(|| anyhow!("rendered buffer does not form a {0}x{0} image", args.size))?;
    image
        .save_with_format(&args.out, ImageFormat::Png)
        .with_context(|| format!("failed to write preview to {}", args.out.display()))?;
    tracing::info!(out = %args.out.display(), size = args.size, "preview written");
    Ok(())
}

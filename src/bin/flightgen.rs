//! Offline flight-file generator.
//!
//! Usage:
//!   flightgen linear <out> <frames> <x0 y0 z0 yaw0 pitch0 roll0> <x1 y1 z1 yaw1 pitch1 roll1>
//!   flightgen orbit  <out> <frames> <tx ty tz> <distance> <start_azimuth> <azimuth_span>

use anyhow::{bail, Context, Result};
use nalgebra::Point3;

use terratrack::flight::writer;
use terratrack::flight::Pose;

fn parse_f64(args: &[String], idx: usize, name: &str) -> Result<f64> {
    args.get(idx)
        .with_context(|| format!("missing argument <{name}>"))?
        .parse()
        .with_context(|| format!("argument <{name}> is not a number"))
}

fn parse_pose(args: &[String], base: usize) -> Result<Pose> {
    Ok(Pose::new(
        parse_f64(args, base, "x")?,
        parse_f64(args, base + 1, "y")?,
        parse_f64(args, base + 2, "z")?,
        parse_f64(args, base + 3, "yaw")?,
        parse_f64(args, base + 4, "pitch")?,
        parse_f64(args, base + 5, "roll")?,
    ))
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str);

    match mode {
        Some("linear") => {
            let out = args.get(2).context("missing output path")?;
            let frames: u32 = args
                .get(3)
                .context("missing frame count")?
                .parse()
                .context("frame count is not an integer")?;
            let start = parse_pose(&args, 4)?;
            let end = parse_pose(&args, 10)?;
            writer::interpolate(out, frames, start, end)?;
            println!("wrote {frames} poses to {out}");
        }
        Some("orbit") => {
            let out = args.get(2).context("missing output path")?;
            let frames: u32 = args
                .get(3)
                .context("missing frame count")?
                .parse()
                .context("frame count is not an integer")?;
            let target = Point3::new(
                parse_f64(&args, 4, "tx")?,
                parse_f64(&args, 5, "ty")?,
                parse_f64(&args, 6, "tz")?,
            );
            let distance = parse_f64(&args, 7, "distance")?;
            let start_azimuth = parse_f64(&args, 8, "start_azimuth")?;
            let azimuth_span = parse_f64(&args, 9, "azimuth_span")?;
            writer::orbit_equator(out, frames, target, distance, start_azimuth, azimuth_span)?;
            println!("wrote {frames} poses to {out}");
        }
        _ => {
            bail!(
                "usage: flightgen linear <out> <frames> <start pose: 6 numbers> <end pose: 6 numbers>\n\
                 \x20      flightgen orbit <out> <frames> <tx ty tz> <distance> <start_azimuth> <azimuth_span>"
            );
        }
    }
    Ok(())
}

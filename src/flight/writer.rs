//! Offline flight-path generators.
//!
//! Both generators write the same line-oriented format the loader reads: a
//! `view craft` header naming the target frame, then one `start` line per
//! pose.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::Point3;

use super::Pose;

fn write_pose<W: Write>(w: &mut W, pose: &Pose) -> Result<()> {
    writeln!(
        w,
        "start {} {} {} {} {} {}",
        pose.x, pose.y, pose.z, pose.yaw, pose.pitch, pose.roll
    )?;
    Ok(())
}

fn create<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "view craft")?;
    Ok(writer)
}

/// Write `frames` poses stepping linearly from `start` to `end`
/// componentwise; pose i is start + (i/frames) * (end - start).
pub fn interpolate<P: AsRef<Path>>(path: P, frames: u32, start: Pose, end: Pose) -> Result<()> {
    let mut writer = create(path)?;

    let n = frames as f64;
    let step = Pose::new(
        (end.x - start.x) / n,
        (end.y - start.y) / n,
        (end.z - start.z) / n,
        (end.yaw - start.yaw) / n,
        (end.pitch - start.pitch) / n,
        (end.roll - start.roll) / n,
    );

    let mut current = start;
    for _ in 0..frames {
        write_pose(&mut writer, &current)?;
        current = Pose::new(
            current.x + step.x,
            current.y + step.y,
            current.z + step.z,
            current.yaw + step.yaw,
            current.pitch + step.pitch,
            current.roll + step.roll,
        );
    }
    writer.flush()?;
    Ok(())
}

/// Write `frames` poses on a horizontal circle of radius `distance` around
/// `target`. For frame i the azimuth is start + (span/frames) * i wrapped to
/// [0, 360); the camera yaws back toward the target, pitch and roll zero.
pub fn orbit_equator<P: AsRef<Path>>(
    path: P,
    frames: u32,
    target: Point3<f64>,
    distance: f64,
    start_azimuth: f64,
    azimuth_span: f64,
) -> Result<()> {
    let mut writer = create(path)?;

    let azimuth_step = azimuth_span / frames as f64;
    for i in 0..frames {
        let azimuth = (start_azimuth + azimuth_step * i as f64).rem_euclid(360.0);
        let pose = Pose::new(
            target.x + distance * azimuth.to_radians().sin(),
            target.y + distance * azimuth.to_radians().cos(),
            target.z,
            360.0 - (azimuth + 180.0).rem_euclid(360.0),
            0.0,
            0.0,
        );
        write_pose(&mut writer, &pose)?;
    }
    writer.flush()?;
    Ok(())
}

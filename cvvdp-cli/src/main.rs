//! Command-line front end for the cvvdp metric.
//!
//! Handles the concerns the core leaves to collaborators: image decoding,
//! sRGB to DKL-D65 color conversion through the display model, heatmap
//! rendering, and result formatting.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use image::RgbImage;

use cvvdp::image::ImageF;
use cvvdp::source::{ArrayVideoSource, ColorFrame};
use cvvdp::{
    CalibrationOverride, Cvvdp, CvvdpParameters, DisplayModel, HeatmapMode, StandardDisplay,
};

/// sRGB linear RGB to XYZ (D65).
const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

/// XYZ to LMS cone responses (CIE 2006 observer).
const XYZ_TO_LMS2006: [[f32; 3]; 3] = [
    [0.187596268556126, 0.585168649077728, -0.026384263306304],
    [-0.133397430663221, 0.405505777260049, 0.034502127690364],
    [0.000244379021663, -0.000542995890619, 0.019406849066323],
];

/// LMS2006 to the DKL opponent space, D65 adapted.
const LMS_TO_DKL: [[f32; 3]; 3] = [
    [1.0, 1.0, 0.0],
    [1.0, -2.311130179947035, 0.0],
    [-1.0, -1.0, 50.977571328718781],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable report with a quality rating.
    Text,
    /// Score, rating and pooled features as JSON.
    Json,
    /// Just the quality rating.
    Quality,
    /// Just the JOD number.
    Score,
}

#[derive(Parser)]
#[command(
    name = "cvvdp",
    about = "Perceptual image quality: JOD score for a test against a reference",
    version
)]
struct Args {
    /// Distorted image (PNG or JPEG).
    test: PathBuf,

    /// Pristine reference image, same dimensions.
    reference: PathBuf,

    /// Display preset: standard_4k, standard_fhd or standard_hdr.
    #[arg(long, default_value = "standard_4k")]
    display: String,

    /// Override the display's pixels-per-degree.
    #[arg(long)]
    ppd: Option<f32>,

    /// Metric parameter JSON file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibration override JSON applied on top of the parameters.
    #[arg(long)]
    calibration: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Exit with code 1 when the score falls below this JOD value.
    #[arg(long)]
    min_jod: Option<f64>,

    /// Write a visibility heatmap PNG to this path.
    #[arg(long)]
    heatmap: Option<PathBuf>,

    /// Print the metric configuration before the result.
    #[arg(long)]
    info: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(passed) => process::exit(if passed { 0 } else { 1 }),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            process::exit(2);
        }
    }
}

fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let mut params = match &args.config {
        Some(path) => CvvdpParameters::from_json_file(path)?,
        None => CvvdpParameters::default(),
    };
    if let Some(path) = &args.calibration {
        let ovr = CalibrationOverride::from_json_file(path)?;
        params.apply_override(&ovr);
    }

    let mut display = StandardDisplay::preset(&args.display)
        .ok_or_else(|| format!("unknown display preset \"{}\"", args.display))?;
    if let Some(ppd) = args.ppd {
        display = StandardDisplay::new(
            &args.display,
            display.peak_luminance(),
            display.black_level(),
            ppd,
        );
    }

    let test = load_frame(&args.test, &display)?;
    let reference = load_frame(&args.reference, &display)?;
    let source = ArrayVideoSource::from_images(test, reference)?;

    let mut metric = Cvvdp::new(params, Box::new(display))?;
    if args.heatmap.is_some() {
        metric = metric.with_heatmap(HeatmapMode::Raw);
    }

    if args.info {
        eprintln!("{}", metric.info_string());
    }

    let started = std::time::Instant::now();
    let (jod, stats) = metric.predict_source(&source)?;
    log::info!("prediction finished in {:.1?}", started.elapsed());

    if let Some(path) = &args.heatmap {
        let frames = stats.heatmap.as_ref().ok_or("heatmap was not produced")?;
        write_heatmap_png(path, &frames[0])?;
    }

    match args.format {
        OutputFormat::Text => {
            println!(
                "{} {:.4} JOD ({})",
                "quality:".bold(),
                jod,
                colored_rating(jod)
            );
            println!(
                "  {}x{} pixels, {} spatial bands",
                stats.width,
                stats.height,
                stats.band_freqs.len()
            );
        }
        OutputFormat::Json => {
            let out = serde_json::json!({
                "jod": jod,
                "rating": quality_rating(jod),
                "width": stats.width,
                "height": stats.height,
                "features": stats.to_feature_json(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Quality => println!("{}", quality_rating(jod)),
        OutputFormat::Score => println!("{jod:.6}"),
    }

    Ok(args.min_jod.map_or(true, |min| jod >= min))
}

/// Decodes an image and converts it to an absolute-luminance DKL frame.
fn load_frame(path: &Path, display: &StandardDisplay) -> Result<ColorFrame, Box<dyn std::error::Error>> {
    let rgb = image::open(path)?.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let mut planes = [ImageF::new(w, h), ImageF::new(w, h), ImageF::new(w, h)];

    let black = display.black_level();
    let peak = display.peak_luminance();
    for (x, y, px) in rgb.enumerate_pixels() {
        // sRGB EOTF, then absolute luminance per channel.
        let lin = px.0.map(|v| {
            let v = f32::from(v) / 255.0;
            let v = if v <= 0.04045 {
                v / 12.92
            } else {
                ((v + 0.055) / 1.055).powf(2.4)
            };
            black + (peak - black) * v
        });
        let xyz = mat3_mul(&RGB_TO_XYZ, lin);
        let lms = mat3_mul(&XYZ_TO_LMS2006, xyz);
        let dkl = mat3_mul(&LMS_TO_DKL, lms);
        for (plane, v) in planes.iter_mut().zip(dkl) {
            plane.set(x as usize, y as usize, v);
        }
    }
    Ok(planes)
}

fn mat3_mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn quality_rating(jod: f64) -> &'static str {
    if jod >= 9.5 {
        "imperceptible"
    } else if jod >= 8.5 {
        "barely visible"
    } else if jod >= 7.0 {
        "visible but not annoying"
    } else if jod >= 5.0 {
        "annoying"
    } else {
        "very annoying"
    }
}

fn colored_rating(jod: f64) -> colored::ColoredString {
    let rating = quality_rating(jod);
    if jod >= 8.5 {
        rating.green()
    } else if jod >= 7.0 {
        rating.yellow()
    } else {
        rating.red()
    }
}

/// Renders a heatmap frame with a blue (invisible) to red (clearly
/// visible) ramp. Values are in JOD-difference units; 1 JOD and above
/// saturates.
fn write_heatmap_png(
    path: &Path,
    frame: &imgref::ImgVec<f32>,
) -> Result<(), Box<dyn std::error::Error>> {
    render_heatmap(frame).save(path)?;
    Ok(())
}

fn render_heatmap(frame: &imgref::ImgVec<f32>) -> RgbImage {
    let (w, h) = (frame.width(), frame.height());
    let mut out = RgbImage::new(w as u32, h as u32);
    for (y, row) in frame.rows().enumerate() {
        for (x, &v) in row.iter().enumerate() {
            out.put_pixel(x as u32, y as u32, image::Rgb(ramp(v.clamp(0.0, 1.0))));
        }
    }
    out
}

fn ramp(t: f32) -> [u8; 3] {
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let (r, g, b) = if t < 0.5 {
        // blue to green
        let t = t * 2.0;
        (0.0, lerp(0.0, 1.0, t), lerp(1.0, 0.0, t))
    } else {
        // green to red
        let t = (t - 0.5) * 2.0;
        (lerp(0.0, 1.0, t), lerp(1.0, 0.0, t), 0.0)
    };
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bands() {
        assert_eq!(quality_rating(10.0), "imperceptible");
        assert_eq!(quality_rating(9.0), "barely visible");
        assert_eq!(quality_rating(4.0), "very annoying");
    }

    #[test]
    fn test_ramp_endpoints() {
        assert_eq!(ramp(0.0), [0, 0, 255]);
        assert_eq!(ramp(1.0), [255, 0, 0]);
    }

    #[test]
    fn test_heatmap_render_matches_frame_geometry() {
        let frame = imgref::ImgVec::new(vec![0.0f32, 0.25, 0.75, 2.0], 2, 2);
        let out = render_heatmap(&frame);
        assert_eq!((out.width(), out.height()), (2, 2));
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255]);
        // values above 1 JOD saturate to full red
        assert_eq!(out.get_pixel(1, 1).0, [255, 0, 0]);
    }

    #[test]
    fn test_white_maps_to_positive_luminance() {
        let lin = [200.0f32, 200.0, 200.0];
        let xyz = mat3_mul(&RGB_TO_XYZ, lin);
        let lms = mat3_mul(&XYZ_TO_LMS2006, xyz);
        let dkl = mat3_mul(&LMS_TO_DKL, lms);
        // Channel 0 (L+M) carries the luminance.
        assert!(dkl[0] > 100.0 && dkl[0] < 300.0, "got {}", dkl[0]);
        // Neutral gray has small opponent responses relative to luminance.
        assert!(dkl[1].abs() < dkl[0] * 0.2);
    }
}

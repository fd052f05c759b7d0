use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::{Context, Result, anyhow};
use log::info;
use texture_histogram::{
    CalculatorConfig, HistogramPainter, HistogramSpec, RegionOfInterest,
    gpu::{FloatTexture, GraphicsTexture, GpuContext, SharedTextureProvider, initialize_device},
};

const HEAT_MAP_SIZE: u32 = 256;
const SELECTION_SIZE: f64 = 0.1;

#[derive(Debug, Clone)]
struct Cli {
    config: Option<PathBuf>,
    image: Option<PathBuf>,
    steps: u32,
    kernel: Option<PathBuf>,
}

impl Default for Cli {
    fn default() -> Self {
        Cli {
            config: None,
            image: None,
            steps: 200,
            kernel: None,
        }
    }
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --config"));
                };
                cli.config = Some(PathBuf::from(v));
                i += 2;
            }
            "--image" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --image"));
                };
                cli.image = Some(PathBuf::from(v));
                i += 2;
            }
            "--steps" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --steps"));
                };
                cli.steps = v
                    .parse()
                    .map_err(|e| anyhow!("invalid --steps value {v:?}: {e}"))?;
                i += 2;
            }
            "--kernel" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --kernel"));
                };
                cli.kernel = Some(PathBuf::from(v));
                i += 2;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --config <calculator.json>, --image <path>, --steps <n>, --kernel <path>)"
                ));
            }
        }
    }
    Ok(cli)
}

/// Two warm spots on a cool background, values in `[0, 1]`.
fn synthetic_heat_map(size: u32) -> Vec<f32> {
    let spots = [([0.3f32, 0.35f32], 0.12f32, 0.9f32), ([0.7, 0.6], 0.2, 0.6)];
    let mut values = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let u = (x as f32 + 0.5) / size as f32;
            let v = (y as f32 + 0.5) / size as f32;
            let heat: f32 = spots
                .iter()
                .map(|([cx, cy], radius, peak)| {
                    let d2 = (u - cx).powi(2) + (v - cy).powi(2);
                    peak * (-d2 / (2.0 * radius * radius)).exp()
                })
                .sum();
            values.push(heat.clamp(0.0, 1.0));
        }
    }
    values
}

fn load_texture(gpu: &GpuContext, image: Option<&PathBuf>) -> Result<GraphicsTexture> {
    match image {
        Some(path) => FloatTexture::from_image_path(gpu, path),
        None => FloatTexture::upload(
            gpu,
            HEAT_MAP_SIZE,
            HEAT_MAP_SIZE,
            &synthetic_heat_map(HEAT_MAP_SIZE),
            wgpu::TextureFormat::R32Float,
        ),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;

    let mut config = match cli.config.as_deref() {
        Some(path) => CalculatorConfig::from_path(path)?,
        None => CalculatorConfig::new(HistogramSpec::new(10, 0.0, 1.0)?),
    };
    if let Some(kernel) = cli.kernel {
        config = config.with_kernel_path(kernel);
    }

    let gpu = initialize_device(config.device_index).context("failed to open a GPU device")?;
    let texture = load_texture(&gpu, cli.image.as_ref())?;
    info!(
        "histogram source: texture {} ({}x{})",
        texture.handle(),
        texture.width(),
        texture.height()
    );

    let provider = Arc::new(SharedTextureProvider::new(gpu.clone()));
    provider.publish(texture);
    let mut painter = HistogramPainter::new(config, provider);

    let started = Instant::now();
    for step in 0..cli.steps {
        let t = if cli.steps > 1 {
            step as f64 / (cli.steps - 1) as f64
        } else {
            0.0
        };
        let centre = 0.05 + 0.9 * t;
        let region =
            RegionOfInterest::from_center_size([centre, centre], [SELECTION_SIZE, SELECTION_SIZE]);
        match painter.paint(&region) {
            Some(result) => info!(
                "step {step}: u,v in [{:.3}, {:.3}] total={} peak={:?} counts={:?}",
                region.min_u,
                region.max_u,
                result.total(),
                result.peak_bin(),
                result.counts()
            ),
            None => info!("step {step}: no histogram yet"),
        }
    }
    info!(
        "{} steps in {:.1} ms",
        cli.steps,
        started.elapsed().as_secs_f64() * 1000.0
    );

    painter.dispose();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cli_defaults() {
        let cli = parse_cli(&[]).unwrap();
        assert_eq!(cli.steps, 200);
        assert!(cli.config.is_none() && cli.image.is_none() && cli.kernel.is_none());
    }

    #[test]
    fn parse_cli_all_flags() {
        let args: Vec<String> = [
            "--config", "calc.json", "--image", "heat.exr", "--steps", "12", "--kernel", "k.wgsl",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let cli = parse_cli(&args).unwrap();
        assert_eq!(cli.config.as_ref().unwrap(), &PathBuf::from("calc.json"));
        assert_eq!(cli.image.as_ref().unwrap(), &PathBuf::from("heat.exr"));
        assert_eq!(cli.steps, 12);
        assert_eq!(cli.kernel.as_ref().unwrap(), &PathBuf::from("k.wgsl"));
    }

    #[test]
    fn parse_cli_rejects_unknown_and_missing_values() {
        assert!(parse_cli(&["--bogus".to_string()]).is_err());
        assert!(parse_cli(&["--steps".to_string()]).is_err());
        assert!(parse_cli(&["--steps".to_string(), "many".to_string()]).is_err());
    }

    #[test]
    fn heat_map_stays_in_unit_range() {
        let values = synthetic_heat_map(32);
        assert_eq!(values.len(), 32 * 32);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}

//! tiltscan CLI — spot centroid, surface tilt and height-profile reconstruction.

mod render;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tiltscan::{
    EvenIntervalRule, FitError, FitRenderError, GaussianParams, Grid, HeightProfile,
    IntensityImage, ProfileReconstructor, SimpsonIntegrator, SlopeConversion, SlopeField,
    TiltScanConfig, N_PARAMS,
};

use render::ContourPngRenderer;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "tiltscan")]
#[command(about = "Surface tilt from reflected laser spots and height profiles from slope fields")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a 2D Gaussian to the spot and print the fit as JSON.
    Centroid(CliCentroidArgs),

    /// Print surface tilt in arcseconds.
    Tilt(CliMeasureArgs),

    /// Print surface slope.
    Slope(CliSlopeArgs),

    /// Reconstruct a height profile from a JSON slope field.
    Profile(CliProfileArgs),

    /// Reconstruct h(x, y) = x² + (y/2)² from its analytic slopes.
    ProfileDemo,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// JSON configuration file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct GuessArgs {
    /// Initial amplitude.
    #[arg(long)]
    amplitude: Option<f64>,

    /// Initial spot center x (pixels).
    #[arg(long)]
    center_x: Option<f64>,

    /// Initial spot center y (pixels).
    #[arg(long)]
    center_y: Option<f64>,

    /// Initial sigma along x (pixels).
    #[arg(long)]
    sigma_x: Option<f64>,

    /// Initial sigma along y (pixels).
    #[arg(long)]
    sigma_y: Option<f64>,

    /// Initial rotation (radians).
    #[arg(long)]
    rotation: Option<f64>,

    /// Initial background offset.
    #[arg(long)]
    offset: Option<f64>,

    /// Maximum model evaluations for the solver.
    #[arg(long)]
    max_evaluations: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct BenchArgs {
    /// Parallel distance d from the sensor to the surface (m).
    #[arg(long)]
    d: Option<f64>,

    /// Perpendicular distance w from the sensor to the surface (m).
    #[arg(long)]
    w: Option<f64>,

    /// Sensor pixel size (m).
    #[arg(long)]
    pixel_size: Option<f64>,
}

#[derive(Debug, Clone, Args)]
struct CliCentroidArgs {
    /// Path to the sensor frame (8- or 16-bit grayscale).
    #[arg(long)]
    image: PathBuf,

    /// Write the frame with fitted-model contours to this PNG.
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Write the fit result (JSON) here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    guess: GuessArgs,
}

#[derive(Debug, Clone, Args)]
struct CliMeasureArgs {
    /// Path to the sensor frame (8- or 16-bit grayscale).
    #[arg(long)]
    image: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    guess: GuessArgs,

    #[command(flatten)]
    bench: BenchArgs,
}

#[derive(Debug, Clone, Args)]
struct CliSlopeArgs {
    #[command(flatten)]
    measure: CliMeasureArgs,

    /// Use the exact arcsecond-to-radian conversion.
    #[arg(long)]
    exact_slope: bool,
}

#[derive(Debug, Clone, Args)]
struct CliProfileArgs {
    /// JSON file with `x`, `y`, `x_slope` and `y_slope`.
    #[arg(long)]
    slopes: PathBuf,

    /// Write the profile (JSON) here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Rule for the leftover interval on even-length axes.
    #[arg(long, value_enum)]
    even_rule: Option<EvenRuleArg>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EvenRuleArg {
    Avg,
    Last,
    First,
}

impl EvenRuleArg {
    fn to_core(self) -> EvenIntervalRule {
        match self {
            Self::Avg => EvenIntervalRule::Average,
            Self::Last => EvenIntervalRule::TrapezoidLast,
            Self::First => EvenIntervalRule::TrapezoidFirst,
        }
    }
}

/// Slope field file layout; rows follow `y`, columns follow `x`.
#[derive(Debug, Deserialize)]
struct SlopeFieldFile {
    x: Vec<f64>,
    y: Vec<f64>,
    x_slope: Vec<Vec<f64>>,
    y_slope: Vec<Vec<f64>>,
}

/// Fit output when the covariance is singular: parameters without errors.
#[derive(Debug, Serialize)]
struct PartialFit {
    params: GaussianParams,
    standard_errors: Option<[f64; N_PARAMS]>,
    image_size: [usize; 2],
    cost: f64,
}

impl PartialFit {
    fn from_error(err: &FitError, image_size: [usize; 2]) -> Option<Self> {
        match err {
            FitError::SingularCovariance { params, cost } => Some(Self {
                params: *params,
                standard_errors: None,
                image_size,
                cost: *cost,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ProfileOutput<'a> {
    x: &'a [f64],
    y: &'a [f64],
    height: Vec<Vec<f64>>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Centroid(args) => run_centroid(&args),
        Commands::Tilt(args) => run_tilt(&args),
        Commands::Slope(args) => run_slope(&args),
        Commands::Profile(args) => run_profile(&args),
        Commands::ProfileDemo => run_profile_demo(),
    }
}

// ── config & I/O ───────────────────────────────────────────────────────

fn load_config(args: &ConfigArgs) -> CliResult<TiltScanConfig> {
    let Some(path) = &args.config else {
        return Ok(TiltScanConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| -> CliError {
        format!("Failed to read config {}: {}", path.display(), e).into()
    })?;
    let config = serde_json::from_str(&text).map_err(|e| -> CliError {
        format!("Invalid config {}: {}", path.display(), e).into()
    })?;
    tracing::info!("Loaded config: {}", path.display());
    Ok(config)
}

fn apply_guess(config: &mut TiltScanConfig, args: &GuessArgs) {
    let g = &mut config.guess;
    let overrides = [
        (&mut g.amplitude, args.amplitude),
        (&mut g.center_x, args.center_x),
        (&mut g.center_y, args.center_y),
        (&mut g.sigma_x, args.sigma_x),
        (&mut g.sigma_y, args.sigma_y),
        (&mut g.rotation, args.rotation),
        (&mut g.offset, args.offset),
    ];
    for (slot, value) in overrides {
        if let Some(v) = value {
            *slot = v;
        }
    }
    if let Some(n) = args.max_evaluations {
        config.fit.max_evaluations = n;
    }
}

fn apply_bench(config: &mut TiltScanConfig, args: &BenchArgs) {
    if let Some(d) = args.d {
        config.tilt.bench.parallel_distance_m = d;
    }
    if let Some(w) = args.w {
        config.tilt.bench.perpendicular_distance_m = w;
    }
    if let Some(px) = args.pixel_size {
        config.tilt.sensor.pixel_size_m = px;
    }
}

fn load_image(path: &Path) -> CliResult<IntensityImage> {
    tracing::info!("Loading image: {}", path.display());
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    let color = img.color();
    let wide = color.bytes_per_pixel() > color.channel_count();
    let frame = if wide {
        IntensityImage::try_from(&img.to_luma16())?
    } else {
        IntensityImage::try_from(&img.to_luma8())?
    };
    tracing::info!(
        "Image size: {}x{} ({}-bit)",
        frame.width(),
        frame.height(),
        if wide { 16 } else { 8 }
    );
    Ok(frame)
}

fn emit_json<T: Serialize>(value: &T, out: Option<&Path>) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Results written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

// ── centroid ───────────────────────────────────────────────────────────

fn run_centroid(args: &CliCentroidArgs) -> CliResult<()> {
    let mut config = load_config(&args.config)?;
    apply_guess(&mut config, &args.guess);
    let image = load_image(&args.image)?;
    let fitter = config.fitter();

    let outcome = match &args.plot {
        Some(plot) => {
            let mut renderer = ContourPngRenderer::new(plot.clone());
            match fitter.fit_and_render(&image, &config.guess, &mut renderer) {
                Ok(fit) => Ok(fit),
                Err(FitRenderError::Fit(err)) => Err(err),
                Err(err) => return Err(err.into()),
            }
        }
        None => fitter.fit(&image, &config.guess),
    };

    match outcome {
        Ok(fit) => emit_json(&fit, args.out.as_deref()),
        Err(err) => {
            // Parameters survive a singular covariance; emit them, then fail.
            let image_size = [image.width(), image.height()];
            if let Some(partial) = PartialFit::from_error(&err, image_size) {
                tracing::warn!("Standard errors unavailable; writing parameters only");
                emit_json(&partial, args.out.as_deref())?;
            }
            Err(err.into())
        }
    }
}

// ── tilt / slope ───────────────────────────────────────────────────────

fn prepare_measure(args: &CliMeasureArgs) -> CliResult<(TiltScanConfig, IntensityImage)> {
    let mut config = load_config(&args.config)?;
    apply_guess(&mut config, &args.guess);
    apply_bench(&mut config, &args.bench);
    let image = load_image(&args.image)?;
    Ok((config, image))
}

fn run_tilt(args: &CliMeasureArgs) -> CliResult<()> {
    let (config, image) = prepare_measure(args)?;
    let tilt = config
        .tilt
        .measure_tilt(&config.fitter(), &image, &config.guess)?;
    tracing::info!(
        "Tilt: x={:.3}\" y={:.3}\"",
        tilt.x_arcsec,
        tilt.y_arcsec
    );
    emit_json(&tilt, None)
}

fn run_slope(args: &CliSlopeArgs) -> CliResult<()> {
    let (mut config, image) = prepare_measure(&args.measure)?;
    if args.exact_slope {
        config.tilt.slope_conversion = SlopeConversion::Exact;
    }
    let slope = config
        .tilt
        .measure_slope(&config.fitter(), &image, &config.guess)?;
    emit_json(&slope, None)
}

// ── profile ────────────────────────────────────────────────────────────

fn run_profile(args: &CliProfileArgs) -> CliResult<()> {
    let mut config = load_config(&args.config)?;
    if let Some(rule) = args.even_rule {
        config.integration = SimpsonIntegrator::new(rule.to_core());
    }

    let text = std::fs::read_to_string(&args.slopes).map_err(|e| -> CliError {
        format!("Failed to read slopes {}: {}", args.slopes.display(), e).into()
    })?;
    let file: SlopeFieldFile = serde_json::from_str(&text)?;
    let field = SlopeField::new(Grid::from_rows(&file.x_slope)?, Grid::from_rows(&file.y_slope)?)?;
    let [rows, cols] = field.shape();
    tracing::info!("Slope field: {}x{} ({:?})", rows, cols, config.integration.even_rule);

    let profile = config.reconstructor().reconstruct(&field, &file.x, &file.y)?;
    let output = ProfileOutput {
        x: &file.x,
        y: &file.y,
        height: profile.to_rows(),
    };
    emit_json(&output, args.out.as_deref())
}

// ── profile-demo ───────────────────────────────────────────────────────

fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| a + (b - a) * i as f64 / (n - 1) as f64)
        .collect()
}

fn print_grid(label: &str, rows: &[Vec<f64>]) {
    println!("{}:", label);
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| format!("{:8.3}", v)).collect();
        println!("  [{}]", cells.join(" "));
    }
}

fn run_profile_demo() -> CliResult<()> {
    let x = linspace(0.0, 5.0, 6);
    let y = linspace(0.0, 6.0, 7);
    let field = SlopeField::from_fn(&x, &y, |x, _| 2.0 * x, |_, y| 0.5 * y);

    let integrator = SimpsonIntegrator::default();
    let profile: HeightProfile =
        ProfileReconstructor::new(integrator).reconstruct(&field, &x, &y)?;

    // Outer sum of the running integrals along the first row and column.
    let ix = integrator.cumulative(field.x_slope().row(0), &x)?;
    let iy = integrator.cumulative(&field.y_slope().column(0), &y)?;
    let reference: Vec<Vec<f64>> = iy
        .iter()
        .map(|dy| ix.iter().map(|dx| dy + dx).collect())
        .collect();

    println!("x: {:?}", x);
    println!("y: {:?}", y);
    print_grid("x slope", &field.x_slope().to_rows());
    print_grid("y slope", &field.y_slope().to_rows());
    print_grid("height", &profile.to_rows());

    let agree: Vec<Vec<f64>> = reference
        .iter()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(|(c, v)| if profile.get(r, c) == *v { 1.0 } else { 0.0 })
                .collect()
        })
        .collect();
    print_grid("height == outer sum", &agree);

    let all = agree.iter().flatten().all(|&v| v == 1.0);
    tracing::info!("Profile matches outer-sum reference: {}", all);
    Ok(())
}

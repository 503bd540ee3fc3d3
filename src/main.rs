use chrono::Local;
use log::{error, info, LevelFilter};
use p1204::cli::{self, CliArgs};
use p1204::config::{DeviceType, DisplaySettings};
use p1204::error::Result; // Use our custom Result
use p1204::features::load_feature_table;
use p1204::pipeline::QualityModel;
use p1204::plot;
use p1204::temporal::QpDeviationAggregator;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    // Record start time early
    let start_time = Instant::now();

    // Parse arguments first to potentially setup logging based on them
    let args = cli::parse_args();

    if let Err(e) = setup_logging(&args) {
        eprintln!("Error setting up logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting p1204 quality estimation...");
    info!("Arguments: {:?}", args);

    match run(args) {
        Ok(()) => {
            let duration = start_time.elapsed();
            info!("Estimation completed successfully in {:.2?}", duration);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let duration = start_time.elapsed();
            error!("Estimation failed after {:.2?}: {}", duration, e);
            eprintln!("Error: {}", e); // Also print to stderr for visibility
            ExitCode::FAILURE
        }
    }
}

/// Sets up logging to stderr and optionally to a file.
fn setup_logging(args: &CliArgs) -> std::result::Result<(), fern::InitError> {
    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Info)
        .level_for("p1204", LevelFilter::Debug);

    // stdout carries the JSON result
    let console_config = fern::Dispatch::new().chain(std::io::stderr());

    let mut logger = base_config.chain(console_config);

    let mut log_path = None;
    if args.log {
        let log_filename = format!("p1204_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let path = args.output_dir.clone().unwrap_or_else(|| PathBuf::from(".")).join(log_filename);
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        logger = logger.chain(fern::Dispatch::new().chain(fern::log_file(&path)?));
        log_path = Some(path);
    }

    logger.apply()?;
    if let Some(path) = log_path {
        info!("Logging to file: {}", path.display());
    }
    Ok(())
}

/// Main application logic
fn run(args: CliArgs) -> Result<()> {
    // --- 1. Validate Inputs ---
    let device_type: DeviceType = args.device_type.parse()?;
    let display = DisplaySettings::new(&args.device_resolution, &args.viewing_distance, args.display_size)?;
    info!(
        "Device: {} ({}x{}, {}, {}\")",
        device_type, display.width, display.height, display.viewing_distance, display.display_size
    );

    // --- 2. Load Features and Model ---
    let rows = load_feature_table(&args.features)?;
    let model = QualityModel::load(&args.config, device_type, &display)?;

    // --- 3. Predict ---
    let results = model.predict(&rows, &QpDeviationAggregator::default())?;

    // --- 4. Determine Output Paths ---
    let output_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    if !output_dir.exists() {
        info!("Creating output directory: {}", output_dir.display());
        fs::create_dir_all(&output_dir)?;
    }
    let prefix = args.output_prefix.clone().unwrap_or_else(|| {
        args.features.file_stem().map_or_else(
            || "p1204".to_string(),
            |stem| format!("{}_p1204", stem.to_string_lossy()),
        )
    });
    let json_path = output_dir.join(format!("{}.json", prefix));

    // --- 5. Write Results ---
    let json = if results.len() == 1 {
        serde_json::to_string_pretty(&results[0])?
    } else {
        serde_json::to_string_pretty(&results)?
    };
    fs::write(&json_path, &json)?;
    println!("{}", json);
    info!("Saved results: {}", json_path.display());

    // --- 6. Generate Plots ---
    if args.plot {
        for (i, result) in results.iter().enumerate() {
            let name = if results.len() == 1 {
                format!("{}.mos.png", prefix)
            } else {
                format!("{}_{}.mos.png", prefix, i)
            };
            plot::generate_plot(result, &output_dir.join(name))?;
        }
    }

    Ok(())
}

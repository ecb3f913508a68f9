use anyhow::{bail, Context, Result};
use std::env;
use tracing_subscriber::EnvFilter;

use geoassist::{distance, format_distance, nearest, AppConfig, GeoPoint, PlaceCoordinator, PlaceStore};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = AppConfig::load()?;

    match args.first().map(String::as_str) {
        Some("import") => run_import(&config),
        Some("near") => run_near(&config, &args[1..]),
        Some("distance") => run_distance(&args[1..]),
        Some("ui") => run_ui_mode(&config, &args[1..]),
        _ => run_ui_mode(&config, &args),
    }
}

fn parse_coordinate(value: &str, name: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("Invalid {}: {:?}", name, value))
}

fn parse_point(args: &[String]) -> Result<Option<GeoPoint>> {
    match args {
        [] => Ok(None),
        [lat, lon, ..] => Ok(Some(GeoPoint::new(
            parse_coordinate(lat, "latitude")?,
            parse_coordinate(lon, "longitude")?,
        ))),
        _ => bail!("Expected <latitude> <longitude>"),
    }
}

fn open_coordinator(config: &AppConfig) -> Result<PlaceCoordinator> {
    let store = PlaceStore::open(&config.database_path)?;
    Ok(PlaceCoordinator::new(store, config.build_source()).with_filter(config.default_filter))
}

fn run_import(config: &AppConfig) -> Result<()> {
    println!("🗺️  GeoAssist - Place Import");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut coordinator = open_coordinator(config)?;
    println!("\n📂 Fetching from {} ...", coordinator.source_name());

    let report = coordinator.refresh()?;

    println!("✓ Fetched {} places from {}", report.fetched, report.source);
    println!("✓ Inserted: {}", report.stats.inserted);
    println!("✓ Updated: {}", report.stats.updated);
    println!("✓ Unchanged: {}", report.stats.unchanged);
    println!("✓ Processed: {}", report.stats.total());
    println!("\n🔍 Database contains {} places", coordinator.total_places()?);

    Ok(())
}

fn run_near(config: &AppConfig, args: &[String]) -> Result<()> {
    let origin = parse_point(args)?.context("Usage: geoassist near <latitude> <longitude> [limit]")?;
    let limit = match args.get(2) {
        Some(n) => n.parse::<usize>().with_context(|| format!("Invalid limit: {:?}", n))?,
        None => 10,
    };

    let coordinator = open_coordinator(config)?;
    if coordinator.total_places()? == 0 {
        eprintln!("❌ No places cached!");
        eprintln!("   Run: geoassist import");
        std::process::exit(1);
    }

    let visible: Vec<_> = coordinator
        .visible_places()?
        .into_iter()
        .map(|ranked| ranked.place)
        .collect();

    println!("📍 Nearest places to {:.4}, {:.4}\n", origin.latitude, origin.longitude);
    for (i, (place, meters)) in nearest(&visible, origin, limit).iter().enumerate() {
        println!(
            "{:>3}. {:>10}  {:<9} {}  ({})",
            i + 1,
            format_distance(*meters),
            place.category,
            place.name,
            place.address
        );
    }

    Ok(())
}

fn run_distance(args: &[String]) -> Result<()> {
    if args.len() < 4 {
        bail!("Usage: geoassist distance <lat1> <lon1> <lat2> <lon2>");
    }

    let a = GeoPoint::new(parse_coordinate(&args[0], "lat1")?, parse_coordinate(&args[1], "lon1")?);
    let b = GeoPoint::new(parse_coordinate(&args[2], "lat2")?, parse_coordinate(&args[3], "lon2")?);

    let meters = distance(a, b);
    println!("{:.1} m ({})", meters, format_distance(meters));

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig, args: &[String]) -> Result<()> {
    println!("🖥️  Loading GeoAssist UI...\n");

    let mut coordinator = open_coordinator(config)?;

    // First launch: populate the cache before showing anything
    if coordinator.total_places()? == 0 {
        println!("📂 Empty cache, fetching from {} ...", coordinator.source_name());
        coordinator.refresh()?;
    }

    if let Some(position) = parse_point(args)? {
        coordinator.set_user_position(position);
    }

    println!("✓ {} places cached", coordinator.total_places()?);
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = geoassist::ui::App::new(coordinator)?;
    geoassist::ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig, _args: &[String]) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: geoassist near <latitude> <longitude>");
    std::process::exit(1);
}

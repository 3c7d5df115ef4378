//! Campus energy CLI - a command-line front-end for campus energy data.
//!
//! Lists campuses, runs a sync, registers assets and edits the local
//! campus profile. Works from the local cache when the backend is
//! unreachable.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use campus_energy_core::utils::{format_cop, format_kwh, format_percent, truncate_string};
use campus_energy_core::{
    ApiClient, AssetType, CampusProfile, Config, DashboardState, LocalCacheStore, MetricsEngine,
    NewAsset, SyncOrchestrator, SyncOutcome, TokenStore,
};

/// Environment variable enabling a daily-rolling log file
const LOG_DIR_ENV_VAR: &str = "CAMPUS_ENERGY_LOG_DIR";

const USAGE: &str = "\
Usage: campus-energy <command> [args]

Commands:
  campuses                                      List campuses on the backend
  sync [campus_id]                              Refresh data for the selected (or given) campus
  add-asset <name> <type> <kwh/day> [location]  Register an asset on the selected campus
  status                                        Show cache ages and the cached dashboard
  set-token <token>                             Store the API token in the OS keychain
  clear-token                                   Remove the stored API token
  profile [<field> <value> | reset]             Show or edit the local campus profile
                                                (name, city, area, students, monthly_kwh)
  prefs [theme <name> | notifications on|off]   Show or edit display preferences
  config [api_url <url> | timeout <secs>]       Show or edit the configuration file";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV_VAR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir.trim(), "campus-energy.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    let config = Config::load()?;
    info!(command = %command, api = %config.api_base_url, "campus-energy starting");

    match command.as_str() {
        "campuses" => list_campuses(&config).await,
        "sync" => sync(&config, rest).await,
        "add-asset" => add_asset(&config, rest).await,
        "status" => status(&config).await,
        "set-token" => set_token(&config, rest),
        "clear-token" => {
            TokenStore::new(&config.api_base_url).delete()?;
            println!("Token removed for {}", config.api_base_url);
            Ok(())
        }
        "profile" => profile(&config, rest).await,
        "prefs" => prefs(&config, rest),
        "config" => edit_config(config, rest),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

// ============================================================================
// Setup
// ============================================================================

fn open_cache(config: &Config) -> Result<LocalCacheStore> {
    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
    LocalCacheStore::new(cache_dir)
}

fn build_client(config: &Config) -> Result<ApiClient> {
    let mut client = ApiClient::new(&config.api_base_url, config.request_timeout())?;
    if let Some(token) = TokenStore::new(&config.api_base_url).token() {
        client.set_token(token);
    }
    Ok(client)
}

/// Orchestrator primed with whatever the cache holds.
async fn build_orchestrator(config: &Config) -> Result<SyncOrchestrator> {
    let client = build_client(config)?;
    let orchestrator = SyncOrchestrator::new(
        Arc::new(client),
        open_cache(config)?,
        MetricsEngine::new(config.metrics.clone()),
    );
    orchestrator.load_from_cache().await;
    Ok(orchestrator)
}

fn parse_campus_id(value: &str) -> Result<i64> {
    value
        .parse()
        .with_context(|| format!("Invalid campus id '{}'", value))
}

fn parse_number(field: &str, value: &str) -> Result<f64> {
    let number: f64 = value
        .parse()
        .with_context(|| format!("Invalid number for {}: '{}'", field, value))?;
    if !number.is_finite() || number < 0.0 {
        bail!("{} must be a non-negative number", field);
    }
    Ok(number)
}

// ============================================================================
// Commands
// ============================================================================

async fn list_campuses(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    orchestrator
        .refresh_campuses()
        .await
        .context("Failed to load campuses")?;

    let selected = orchestrator.selected_campus().await;
    for campus in orchestrator.campuses().await {
        let marker = if Some(campus.id) == selected { "*" } else { " " };
        println!(
            "{} {:>4}  {:<30} {:<16} {}",
            marker,
            campus.id,
            truncate_string(&campus.name, 30),
            truncate_string(campus.display_city(), 16),
            campus.status.as_str(),
        );
    }
    Ok(())
}

async fn sync(config: &Config, args: &[String]) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    let outcome = match args.first() {
        Some(id) => orchestrator.select_campus(parse_campus_id(id)?).await,
        None => orchestrator.sync(None).await,
    };

    match outcome {
        SyncOutcome::Synced(report) => {
            if !report.degraded.is_empty() {
                let slices: Vec<String> = report.degraded.iter().map(|s| s.to_string()).collect();
                eprintln!("Warning: using previous data for {}", slices.join(", "));
            }
            print_dashboard(&*orchestrator.snapshot().await);
            Ok(())
        }
        SyncOutcome::AlreadySyncing => bail!("A sync is already running"),
        SyncOutcome::Failed(message) => {
            let state = orchestrator.snapshot().await;
            if state.campus_id.is_some() {
                eprintln!("Sync failed ({}), showing cached data", message);
                print_dashboard(&state);
                Ok(())
            } else {
                Err(anyhow!("Sync failed: {}", message))
            }
        }
    }
}

async fn add_asset(config: &Config, args: &[String]) -> Result<()> {
    let [name, asset_type, kwh, location @ ..] = args else {
        bail!("Usage: campus-energy add-asset <name> <type> <kwh/day> [location]");
    };

    let mut new_asset = NewAsset::new(
        name.as_str(),
        AssetType::from_str(asset_type),
        parse_number("kwh/day", kwh)?,
    );
    if !location.is_empty() {
        new_asset.location = Some(location.join(" "));
    }

    let orchestrator = build_orchestrator(config).await?;
    if orchestrator.selected_campus().await.is_none() {
        bail!("No campus selected. Run `campus-energy sync <campus_id>` first.");
    }

    if !orchestrator.add_asset(new_asset).await {
        bail!("The backend did not accept the asset");
    }

    let state = orchestrator.snapshot().await;
    println!(
        "Asset added. {} active assets, {} per month",
        state.asset_totals.active_count,
        format_cop(state.asset_totals.estimated_monthly_cost)
    );
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    let selected = cache.load_selection();
    let ages = cache.get_cache_ages(selected);

    println!("API:       {}", config.api_base_url);
    println!("Cache:     {}", cache.cache_dir().display());
    println!(
        "Campus:    {}",
        selected.map_or_else(|| "none".to_string(), |id| id.to_string())
    );
    println!("Updated:   {}", ages.last_updated());
    if let Some(id) = selected {
        if cache.any_stale(id) {
            println!("           (stale, run `campus-energy sync`)");
        }
    }

    let orchestrator = SyncOrchestrator::new(
        Arc::new(build_client(config)?),
        cache,
        MetricsEngine::new(config.metrics.clone()),
    );
    orchestrator.load_from_cache().await;
    let state = orchestrator.snapshot().await;
    if state.campus_id.is_some() {
        println!();
        print_dashboard(&state);
        for asset in &state.assets {
            println!(
                "    {:<24} {:<14} {:>12}  {}",
                truncate_string(&asset.name, 24),
                asset.asset_type.as_str(),
                format_kwh(asset.consumption),
                asset.status_label()
            );
        }
    }
    Ok(())
}

fn set_token(config: &Config, args: &[String]) -> Result<()> {
    let [token] = args else {
        bail!("Usage: campus-energy set-token <token>");
    };
    TokenStore::new(&config.api_base_url).store(token.trim())?;
    println!("Token stored for {}", config.api_base_url);
    Ok(())
}

async fn profile(config: &Config, args: &[String]) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    let (field, value) = match args {
        [] => {
            let profile = orchestrator.profile().await;
            if profile.is_empty() {
                println!("No profile overrides set");
            } else {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }
            return Ok(());
        }
        [reset] if reset == "reset" => {
            orchestrator.reset_profile().await?;
            println!("Profile overrides removed");
            return Ok(());
        }
        [field, value @ ..] if !value.is_empty() => (field.as_str(), value.join(" ")),
        _ => bail!("Usage: campus-energy profile <field> <value>"),
    };

    let mut patch = CampusProfile::default();
    match field {
        "name" => patch.name = Some(value),
        "city" => patch.city = Some(value),
        "area" => patch.total_area_sqm = Some(parse_number("area", &value)?),
        "students" => {
            patch.population_students = Some(
                value
                    .parse()
                    .with_context(|| format!("Invalid student count '{}'", value))?,
            )
        }
        "monthly_kwh" => patch.average_monthly_kwh = Some(parse_number("monthly_kwh", &value)?),
        other => bail!("Unknown profile field '{}'", other),
    }

    let updated = orchestrator.update_profile(patch).await?;
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

fn prefs(config: &Config, args: &[String]) -> Result<()> {
    let cache = open_cache(config)?;
    let mut preferences = cache.load_preferences();

    match args {
        [] => {}
        [key, value] if key == "theme" => preferences.theme = Some(value.clone()),
        [key, value] if key == "notifications" => {
            preferences.notifications_enabled = match value.as_str() {
                "on" | "true" | "yes" => true,
                "off" | "false" | "no" => false,
                other => bail!("Expected on or off, got '{}'", other),
            }
        }
        _ => bail!("Usage: campus-energy prefs [theme <name> | notifications on|off]"),
    }

    if !args.is_empty() {
        cache.save_preferences(&preferences)?;
    }
    println!("{}", serde_json::to_string_pretty(&preferences)?);
    Ok(())
}

fn edit_config(mut config: Config, args: &[String]) -> Result<()> {
    match args {
        [] => {}
        [key, value] if key == "api_url" => config.api_base_url = value.trim().to_string(),
        [key, value] if key == "timeout" => {
            config.request_timeout_secs = value
                .parse()
                .with_context(|| format!("Invalid timeout '{}'", value))?
        }
        _ => bail!("Usage: campus-energy config [api_url <url> | timeout <secs>]"),
    }

    if !args.is_empty() {
        config.save()?;
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_dashboard(state: &DashboardState) {
    let m = &state.metrics;
    let name = state.campus_name().unwrap_or("(unknown campus)");
    let origin = if state.from_cache { " [cached]" } else { "" };

    println!("{}{}", name, origin);
    println!(
        "  Consumption:   {} / month ({:?})",
        format_kwh(m.monthly_kwh),
        m.sources.monthly_kwh
    );
    println!("  Carbon:        {:.2} t CO2 ({} trees)", m.carbon_footprint_tons, m.trees_equivalent);
    println!("  Per student:   {:.2} kWh", m.kwh_per_student);
    println!("  Intensity:     {:.2} kWh/m2", m.energy_intensity_index);
    println!("  Water:         {:.1} m3", m.water_m3);
    println!("  Efficiency:    {}", format_percent(m.efficiency_score));
    println!(
        "  Waste:         {} ({})",
        format_kwh(m.waste_kwh_monthly),
        format_cop(m.waste_cost_monthly)
    );
    println!("  Projected bill: {}", format_cop(m.projected_bill));
    println!(
        "  Assets:        {} active, {} / day",
        state.asset_totals.active_count,
        format_kwh(state.asset_totals.total_nominal_kwh)
    );
    if let Some(latest) = state.latest_reading {
        println!("  Latest:        {}", format_kwh(latest));
    }
    if !state.has_history {
        println!("  (no consumption history yet)");
    }
}

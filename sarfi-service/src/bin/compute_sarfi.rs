use anyhow::{bail, Result};
use sarfi_service::{
    config::AppConfig,
    observability,
    pipeline::{SarfiFilters, SarfiPipeline, VoltageLevelFilter},
    sources::ConfiguredStore,
    SarfiThreshold,
};
use std::env;
use tokio_util::sync::CancellationToken;

const USAGE: &str =
    "usage: compute_sarfi <profile_id> [voltage_level] [--exclude-special | --include-special]";

#[derive(Debug, PartialEq)]
struct CliArgs {
    profile_id: String,
    voltage_level: Option<String>,
    /// `None` keeps the configured default.
    exclude_special: Option<bool>,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut exclude_special = None;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--exclude-special" | "--include-special" => {
                let exclude = arg == "--exclude-special";
                if exclude_special.is_some_and(|prev| prev != exclude) {
                    bail!("--exclude-special and --include-special are mutually exclusive");
                }
                exclude_special = Some(exclude);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            value => positional.push(value.to_string()),
        }
    }

    let mut positional = positional.into_iter();
    let Some(profile_id) = positional.next() else {
        bail!(USAGE);
    };
    let voltage_level = positional.next();
    if positional.next().is_some() {
        bail!(USAGE);
    }

    Ok(CliArgs {
        profile_id,
        voltage_level,
        exclude_special,
    })
}

impl CliArgs {
    fn filters(&self, defaults: &SarfiFilters) -> SarfiFilters {
        SarfiFilters {
            voltage_level: self
                .voltage_level
                .as_deref()
                .map(VoltageLevelFilter::from)
                .unwrap_or_else(|| defaults.voltage_level.clone()),
            exclude_special_events: self
                .exclude_special
                .unwrap_or(defaults.exclude_special_events),
            ..defaults.clone()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = parse_args(&args)?;
    let profile_id = cli.profile_id.as_str();

    // Load configuration (point SARFI_CONFIG at a snapshot config for offline runs).
    let cfg = AppConfig::load()?;
    observability::init_tracing(&cfg.logging);

    let filters = cli.filters(&cfg.defaults);

    let store = ConfiguredStore::connect(&cfg).await?;
    let pipeline = SarfiPipeline::from_store(store, cfg.fetch.timeout());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let report = pipeline.compute_with_cancel(profile_id, &filters, &cancel).await?;

    for threshold in SarfiThreshold::ALL {
        tracing::info!(
            profile_id,
            threshold = %threshold,
            weighted_avg = report.summary.values.get(threshold),
            "sarfi summary"
        );
    }
    tracing::info!(
        profile_id,
        meters = report.per_meter.len(),
        total_weight = report.summary.total_weight,
        fingerprint = %report.fingerprint(),
        "sarfi report ready"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

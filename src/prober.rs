//! Display discovery over ddcutil.
//!
//! A discovery pass runs `ddcutil detect --brief` (or serves it from the
//! cache file), parses the blob into per-bus candidates up front, then
//! probes every candidate concurrently: a power-state gate over VCP
//! feature D6 followed by the prioritized brightness-code queries. Each
//! display that answers is handed to the caller as soon as its probe
//! completes, so a slow bus never delays the others.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};

use crate::config::{Config, detect_cache_path};
use crate::display::Display;
use crate::runner::CommandRunner;

/// VCP feature for the display power state.
const POWER_MODE_CODE: &str = "D6";
/// DPM on, DPMS active
const POWER_ON_VALUE: &str = "x01";

/// Substrings in ddcutil output that mark a bus without a usable display.
const DEAD_BUS_MARKERS: &[&str] = &["DDC communication failed", "No monitor detected"];

/// One `/dev/i2c-` line from the detect output, paired with the monitor
/// name that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusCandidate {
    pub bus: String,
    pub name: String,
}

/// Parses `ddcutil detect --brief` output into bus candidates.
///
/// Every `/dev/i2c-` line opens a slot, well-formed or not, and the i-th
/// `Monitor:` line is paired with the i-th slot. A malformed bus line
/// therefore still consumes its slot and cannot shift later names onto
/// the wrong bus; it is logged and dropped at the end.
pub fn parse_detect_output(blob: &str) -> Vec<BusCandidate> {
    let mut buses: Vec<Option<String>> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    for line in blob.lines() {
        if let Some(rest) = line.split("/dev/i2c-").nth(1) {
            let bus = rest.trim();
            if !bus.is_empty() && bus.chars().all(|c| c.is_ascii_digit()) {
                buses.push(Some(bus.to_string()));
            } else {
                warn!("Unparseable bus line in detect output: {}", line.trim());
                buses.push(None);
            }
        } else if let Some(rest) = line.split("Monitor:").nth(1) {
            // "Monitor: GSM:LG ULTRAWIDE:311NTAB5M720" - the model sits in
            // the second colon field
            let name = rest
                .trim()
                .split(':')
                .nth(1)
                .unwrap_or(rest.trim())
                .trim()
                .to_string();
            names.push(name);
        }
    }

    buses
        .into_iter()
        .enumerate()
        .filter_map(|(i, bus)| {
            bus.map(|bus| BusCandidate {
                bus,
                name: names.get(i).cloned().unwrap_or_else(|| "Unknown".to_string()),
            })
        })
        .collect()
}

/// Extracts the whitespace tokens of the first `VCP` line in a
/// `getvcp --brief` reply, e.g. `["VCP", "10", "C", "50", "100"]`.
fn vcp_tokens(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("VCP"))
        .map(|line| line.split_whitespace().collect())
        .unwrap_or_default()
}

/// Probes the I2C buses for controllable displays.
pub struct Prober {
    runner: Arc<dyn CommandRunner>,
}

impl Prober {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Runs one full discovery pass.
    ///
    /// `on_device` is invoked once per discovered display, in completion
    /// order; the returned list carries the same displays.
    pub async fn discover<F>(&self, config: &Config, on_device: F) -> Result<Vec<Display>>
    where
        F: Fn(&Display),
    {
        let blob = match self.detect_blob(config).await? {
            Some(blob) => blob,
            None => return Ok(Vec::new()),
        };

        let candidates = parse_detect_output(&blob);
        info!("Detect reported {} bus candidate(s)", candidates.len());

        let mut probes: FuturesUnordered<_> = candidates
            .into_iter()
            .map(|candidate| self.probe_bus(config, candidate))
            .collect();

        let mut displays = Vec::new();
        while let Some(probed) = probes.next().await {
            if let Some(display) = probed {
                info!(
                    "Discovered display '{}' on bus {} (vcp {}, {}/{})",
                    display.name,
                    display.bus,
                    display.vcp_code,
                    (display.current * f64::from(display.max)).round(),
                    display.max
                );
                on_device(&display);
                displays.push(display);
            }
        }

        Ok(displays)
    }

    /// Fetches the detect output, preferring the cache file when enabled.
    /// A fresh scan refreshes the cache.
    async fn detect_blob(&self, config: &Config) -> Result<Option<String>> {
        let cache = detect_cache_path();
        if config.cache_detect_output
            && let Ok(cached) = tokio::fs::read_to_string(&cache).await
            && !cached.trim().is_empty()
        {
            debug!("Using cached detect output from {}", cache.display());
            return Ok(Some(cached));
        }

        let outcome = self.runner.run(config.detect_argv()).await;
        if !outcome.succeeded {
            warn!("ddcutil detect failed: {}", outcome.output.trim());
            return Ok(None);
        }

        // A broken cache must not cost us a successful scan
        if config.cache_detect_output
            && let Err(e) = self.write_cache(&cache, &outcome.output).await
        {
            warn!("Failed to cache detect output: {e:#}");
        }
        Ok(Some(outcome.output))
    }

    async fn write_cache(&self, cache: &PathBuf, blob: &str) -> Result<()> {
        if let Some(parent) = cache.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
        }
        tokio::fs::write(cache, blob)
            .await
            .with_context(|| format!("Failed to write detect cache {}", cache.display()))?;
        debug!("Cached detect output at {}", cache.display());
        Ok(())
    }

    /// Probes one bus: power-state gate, then the brightness codes in
    /// configured priority order.
    async fn probe_bus(&self, config: &Config, candidate: BusCandidate) -> Option<Display> {
        let power = self
            .runner
            .run(config.getvcp_argv(POWER_MODE_CODE, &candidate.bus))
            .await;

        if DEAD_BUS_MARKERS
            .iter()
            .any(|marker| power.output.contains(marker))
        {
            debug!("bus {}: no display responding, skipping", candidate.bus);
            return None;
        }

        if !config.disable_display_state_check
            && !vcp_tokens(&power.output).contains(&POWER_ON_VALUE)
        {
            debug!("bus {}: display not powered on, skipping", candidate.bus);
            return None;
        }

        for code in &config.vcp_codes {
            let reply = self.runner.run(config.getvcp_argv(code, &candidate.bus)).await;
            let tokens = vcp_tokens(&reply.output);

            if tokens.len() < 5 || tokens[2] == "ERR" {
                debug!("bus {}: vcp code {} not usable", candidate.bus, code);
                continue;
            }

            let (Ok(raw), Ok(max)) = (tokens[3].parse::<f64>(), tokens[4].parse::<u16>()) else {
                debug!("bus {}: malformed vcp reply: {:?}", candidate.bus, tokens);
                continue;
            };
            if max == 0 {
                continue;
            }

            return Some(Display {
                bus: candidate.bus,
                name: candidate.name,
                vcp_code: code.clone(),
                max,
                current: raw / f64::from(max),
            });
        }

        debug!(
            "bus {}: no configured vcp code answered, skipping",
            candidate.bus
        );
        None
    }
}

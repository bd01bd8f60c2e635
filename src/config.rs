// src/config.rs  -  Runtime configuration (CLI + TOML)
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::report::SessionScope;
use crate::station::{Callsign, Coordinates, Station};

/// The example config is embedded directly in the binary at compile time.
/// Users can write it out with:  simplex-map --write-config
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml.example");

// ── CLI ───────────────────────────────────────────────────────────────────────
#[derive(Parser, Debug, Default)]
#[command(
    name        = "simplex-map",
    about       = "Simplex check-in propagation map: who can hear whom",
    version,
)]
pub struct Cli {
    /// Config file path (default: ~/.config/simplex-map/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Your callsign (e.g. W7PDX)
    #[arg(long)]
    pub mycall: Option<String>,

    /// Free-form station address, shown in the header
    #[arg(long)]
    pub address: Option<String>,

    /// Station latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Station longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lng: Option<f64>,

    /// Session to join; omit for the no-session view
    #[arg(long)]
    pub session: Option<String>,

    /// Seed the in-process backend from a JSON array of signal_reports rows
    #[arg(long)]
    pub reports: Option<PathBuf>,

    /// Demo mode: W7PDX runs a scripted net and three stations check in
    #[arg(long, action)]
    pub demo: bool,

    /// Print the propagation graph for the session and exit
    #[arg(long, action)]
    pub dump: bool,

    /// Write the built-in default config.toml to the config path and exit.
    /// Use --config <PATH> to write to a custom location.
    #[arg(long, action)]
    pub write_config: bool,

    /// Print the built-in default config.toml to stdout and exit
    #[arg(long, action)]
    pub print_config: bool,
}

// ── TOML file structure ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    pub operator: Option<OperatorCfg>,
    pub session:  Option<SessionCfg>,
    pub display:  Option<DisplayCfg>,
    pub demo:     Option<DemoCfg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorCfg {
    pub callsign: Option<String>,
    pub address:  Option<String>,
    pub lat:      Option<f64>,
    pub lng:      Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCfg {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayCfg {
    /// Rows in the recent reports panel
    pub recent_reports: Option<usize>,
    pub tick_ms:        Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoCfg {
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

// ── Resolved / merged config ──────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mycall:         String,
    pub address:        String,
    pub lat:            f64,
    pub lng:            f64,
    /// Empty means no session
    pub session:        Option<String>,
    pub reports:        Option<PathBuf>,
    pub recent_reports: usize,
    pub tick_ms:        u64,
    pub min_delay_ms:   u64,
    pub max_delay_ms:   u64,
    pub demo:           bool,
    pub dump:           bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mycall:         "N0CALL".into(),
            address:        "Hamilton County, Indiana".into(),
            lat:            39.8617,
            lng:            -86.143,
            session:        None,
            reports:        None,
            recent_reports: 5,
            tick_ms:        50,
            min_delay_ms:   800,
            max_delay_ms:   2500,
            demo:           false,
            dump:           false,
        }
    }
}

// ── Config loader ─────────────────────────────────────────────────────────────
impl AppConfig {
    /// Write the embedded default config to disk.
    /// Returns the path it was written to.
    pub fn write_default_config(cli: &Cli) -> Result<PathBuf> {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating config directory {:?}", parent))?;
        }
        std::fs::write(&path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("Writing config to {:?}", path))?;
        Ok(path)
    }

    pub fn load(cli: &Cli) -> Result<Self> {
        let mut cfg = Self::default();

        // 1. Load TOML file
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Reading config {:?}", path))?;
            let fc: FileConfig = toml::from_str(&raw)
                .with_context(|| format!("Parsing config {:?}", path))?;
            cfg.apply_file(&fc);
        } else if cli.config.is_some() {
            anyhow::bail!("Config file {:?} does not exist", path);
        } else {
            eprintln!(
                "No config file found at {}\n  \
                 → Run `simplex-map --write-config` to create one, then set your callsign.",
                path.display()
            );
        }

        // 2. Apply CLI overrides
        cfg.apply_cli(cli);
        Ok(cfg)
    }

    fn apply_file(&mut self, fc: &FileConfig) {
        if let Some(o) = &fc.operator {
            if let Some(v) = &o.callsign { self.mycall  = v.clone(); }
            if let Some(v) = &o.address  { self.address = v.clone(); }
            if let Some(v) = o.lat       { self.lat     = v; }
            if let Some(v) = o.lng       { self.lng     = v; }
        }
        if let Some(s) = &fc.session {
            if let Some(v) = &s.id { self.session = non_blank(v); }
        }
        if let Some(d) = &fc.display {
            if let Some(v) = d.recent_reports { self.recent_reports = v; }
            if let Some(v) = d.tick_ms        { self.tick_ms        = v.max(1); }
        }
        if let Some(d) = &fc.demo {
            if let Some(v) = d.min_delay_ms { self.min_delay_ms = v; }
            if let Some(v) = d.max_delay_ms { self.max_delay_ms = v; }
        }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = &cli.mycall  { self.mycall  = v.clone(); }
        if let Some(v) = &cli.address { self.address = v.clone(); }
        if let Some(v) = cli.lat      { self.lat     = v; }
        if let Some(v) = cli.lng      { self.lng     = v; }
        if let Some(v) = &cli.session { self.session = non_blank(v); }
        if let Some(v) = &cli.reports { self.reports = Some(v.clone()); }
        if cli.demo                   { self.demo    = true; }
        if cli.dump                   { self.dump    = true; }
    }

    /// The local operator as a map station. Fails on a malformed callsign
    /// or coordinates outside the globe.
    pub fn operator_station(&self) -> Result<Station> {
        let callsign = Callsign::parse(&self.mycall)
            .with_context(|| format!("Operator callsign {:?}", self.mycall))?;
        let coordinates = Coordinates::new(self.lat, self.lng)
            .with_context(|| format!("Operator position for {}", self.address))?;
        Ok(Station::new(callsign, coordinates))
    }

    pub fn scope(&self) -> SessionScope {
        SessionScope::from_column(self.session.as_deref())
    }
}

fn non_blank(v: &str) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn default_config_path() -> PathBuf {
    dirs_next().join("simplex-map").join("config.toml")
}

fn dirs_next() -> PathBuf {
    if let Ok(v) = std::env::var("XDG_CONFIG_HOME") { return PathBuf::from(v); }
    if let Ok(v) = std::env::var("APPDATA")          { return PathBuf::from(v); }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default();
    PathBuf::from(home).join(".config")
}

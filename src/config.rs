//! Command-line configuration for the `ometiff-reader` binary.
//!
//! Options can also be set through environment variables:
//!
//! - `OMETIFF_CACHE_SIZE` - Decoded chunk cache capacity (default: 4GB)
//!
//! Logging follows `RUST_LOG` when set.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Default Values
// =============================================================================

/// Default chunk cache size, as accepted by [`parse_size`].
pub const DEFAULT_CACHE_SIZE: &str = "4GB";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Open pyramidal OME-TIFF files as multiscale image layers.
#[derive(Parser, Debug, Clone)]
#[command(name = "ometiff-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Report whether a path list would be handled; the first path decides.
    Detect(DetectConfig),

    /// Convert a file and print its layer structure.
    Inspect(InspectConfig),
}

#[derive(Args, Debug, Clone)]
pub struct DetectConfig {
    /// Paths to check.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// File to convert. Extra paths are ignored, as when a host passes a list.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Decoded chunk cache capacity (e.g. "512MB", "4GB", or bytes).
    #[arg(long, default_value = DEFAULT_CACHE_SIZE, env = "OMETIFF_CACHE_SIZE")]
    pub cache_size: String,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Read every sample of this level and print its value range.
    #[arg(long)]
    pub read_level: Option<usize>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        let size = self.cache_capacity()?;
        if size == 0 {
            return Err("cache_size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Cache capacity in bytes.
    pub fn cache_capacity(&self) -> Result<usize, String> {
        parse_size(&self.cache_size)
    }
}

/// Parse a byte size such as `"4GB"`, `"512 MB"`, `"64KiB"` or `"1000"`.
///
/// Decimal units (KB, MB, GB, TB) are powers of 1000 and binary units
/// (KiB, MiB, GiB, TiB) powers of 1024. Units are case-insensitive.
pub fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid size {:?}", value))?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1_000,
        "M" | "MB" => 1_000_000,
        "G" | "GB" => 1_000_000_000,
        "T" | "TB" => 1_000_000_000_000,
        "KIB" => 1 << 10,
        "MIB" => 1 << 20,
        "GIB" => 1 << 30,
        "TIB" => 1 << 40,
        other => return Err(format!("unknown size unit {:?} in {:?}", other, value)),
    };

    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes > usize::MAX as f64 {
        return Err(format!("size {:?} is too large", value));
    }
    Ok(bytes as usize)
}

// =============================================================================
// Tests
// =============================================================================

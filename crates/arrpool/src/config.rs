//! Application configuration from CLI flags and environment.

use std::fmt;
use std::str::FromStr;

use clap::Parser;

use arrpool_core::PoolConfig;

/// arrpool: replay an array workload through a pooled arena registry.
#[derive(Parser, Debug)]
#[command(name = "arrpool", version, about)]
#[allow(clippy::struct_excessive_bools)]
pub struct AppConfig {
    /// Number of times the workload is replayed.
    #[arg(
        short = 'n',
        long,
        default_value = "10",
        env = "ARRPOOL_ITERATIONS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub iterations: u64,

    /// Array shape, e.g. `256` or `64x64`. Repeat for several shapes.
    #[arg(short, long = "shape", value_name = "DIMS", default_values = ["256", "32x32"])]
    pub shapes: Vec<Shape>,

    /// Arrays acquired per shape at every level.
    #[arg(short, long, default_value = "2")]
    pub arrays: usize,

    /// Number of nested scopes per iteration.
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..=64))]
    pub depth: u64,

    /// Per-slot N-D cache width (overrides `ARRPOOL_CACHE_WAYS`).
    #[arg(long)]
    pub ways: Option<usize>,

    /// Pre-create every slot the workload needs before the first iteration.
    #[arg(long)]
    pub warm: bool,

    /// Turn pooling off; every acquisition allocates.
    #[arg(long)]
    pub disable: bool,

    /// Run the escape validator at every scope exit.
    #[arg(long)]
    pub debug: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl AppConfig {
    /// Parse CLI arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Pool settings: the `ARRPOOL_*` environment layer with flags on top.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        let mut pool = PoolConfig::from_env();
        if self.disable {
            pool.enabled = false;
        }
        if self.debug {
            pool.debug = true;
        }
        if let Some(ways) = self.ways {
            pool.cache_ways = ways;
        }
        pool
    }
}

/// An array shape given as extents joined by `x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape(pub Vec<usize>);

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty shape".into());
        }
        s.split(['x', 'X'])
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid extent `{part}` in shape `{s}`"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Shape)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, extent) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("x")?;
            }
            write!(f, "{extent}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_shapes() {
        assert_eq!("256".parse::<Shape>(), Ok(Shape(vec![256])));
        assert_eq!("64x32".parse::<Shape>(), Ok(Shape(vec![64, 32])));
        assert_eq!(" 2X3x4 ".parse::<Shape>(), Ok(Shape(vec![2, 3, 4])));
        assert_eq!("0".parse::<Shape>(), Ok(Shape(vec![0])));
    }

    #[test]
    fn reject_bad_shapes() {
        assert!("".parse::<Shape>().is_err());
        assert!("64x".parse::<Shape>().is_err());
        assert!("ax2".parse::<Shape>().is_err());
        assert!("-1".parse::<Shape>().is_err());
    }

    #[test]
    fn shape_display() {
        assert_eq!(Shape(vec![64, 32]).to_string(), "64x32");
        assert_eq!(Shape(vec![7]).to_string(), "7");
    }

    #[test]
    fn defaults() {
        let config = AppConfig::try_parse_from(["arrpool"]).unwrap();
        assert_eq!(config.shapes, vec![Shape(vec![256]), Shape(vec![32, 32])]);
        assert_eq!(config.arrays, 2);
        assert_eq!(config.depth, 1);
        assert!(!config.disable);
    }

    #[test]
    fn flags_override_pool_settings() {
        let config =
            AppConfig::try_parse_from(["arrpool", "--disable", "--debug", "--ways", "8"]).unwrap();
        let pool = config.pool_config();
        assert!(!pool.enabled);
        assert!(pool.debug);
        assert_eq!(pool.cache_ways, 8);
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(AppConfig::try_parse_from(["arrpool", "-n", "0"]).is_err());
    }
}

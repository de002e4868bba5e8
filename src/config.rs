//! Series selection: the `-i <tokens>` option string and its expansion.

use std::collections::HashSet;

use clap::Parser;

use crate::discovery::PortDiscovery;
use crate::error::Error;

pub(crate) const TOTAL_SERIES: &str = "total";
pub(crate) const DEFAULT_OPTIONS: &str = "-i total";

#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct SeriesArgs {
    /// Interfaces to watch, comma separated; `ib`, `ipoib` and `total` expand.
    #[arg(short = 'i', long = "ifname", value_delimiter = ',', default_value = TOTAL_SERIES)]
    ifname: Vec<String>,
}

/// One comma-separated entry of the option string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SeriesToken {
    /// Sum over every active `InfiniBand` port.
    Total,
    /// Every interface on an active `InfiniBand` port.
    Ib,
    /// Every IPoIB interface that is up.
    Ipoib,
    Interface(String),
}

impl From<&str> for SeriesToken {
    fn from(s: &str) -> Self {
        match s {
            TOTAL_SERIES => SeriesToken::Total,
            "ib" => SeriesToken::Ib,
            "ipoib" => SeriesToken::Ipoib,
            name => SeriesToken::Interface(name.to_string()),
        }
    }
}

/// Parses an option string such as `-i total,ib` into tokens.
///
/// A blank string is the same as `-i total`.
pub(crate) fn parse_options(options: &str) -> Result<Vec<SeriesToken>, Error> {
    let options = if options.trim().is_empty() {
        DEFAULT_OPTIONS
    } else {
        options
    };

    let args = SeriesArgs::try_parse_from(options.split_whitespace())
        .map_err(|err| Error::Config(err.render().to_string().trim().to_string()))?;

    Ok(args
        .ifname
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(SeriesToken::from)
        .collect())
}

/// The series a monitor reports, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeriesConfig {
    /// Distinct series names in display order.
    pub(crate) series: Vec<String>,
    /// Interfaces summed into `total`.
    pub(crate) total_ports: Vec<String>,
}

impl SeriesConfig {
    /// Expands the keyword tokens against what is currently discovered.
    ///
    /// Keywords expand in sorted order. A name that appears more than once,
    /// whether literal or expanded, is reported once at its first position.
    pub(crate) fn resolve(tokens: &[SeriesToken], discovery: &impl PortDiscovery) -> Self {
        let total_ports = discovery.active_ib_ports();

        let mut series = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |name: String| {
            if seen.insert(name.clone()) {
                series.push(name);
            }
        };

        for token in tokens {
            match token {
                SeriesToken::Total => push(TOTAL_SERIES.to_string()),
                SeriesToken::Ib => total_ports.iter().cloned().for_each(&mut push),
                SeriesToken::Ipoib => discovery.active_ipoib().into_iter().for_each(&mut push),
                SeriesToken::Interface(name) => push(name.clone()),
            }
        }

        Self {
            series,
            total_ports,
        }
    }

    pub(crate) fn has_total(&self) -> bool {
        self.series.iter().any(|name| name == TOTAL_SERIES)
    }
}

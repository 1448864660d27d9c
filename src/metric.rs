//! Metric kinds shown by the indicator and the payload parser for their values

/// Number of metric kinds, used to size the per-kind tables
pub const METRIC_COUNT: usize = 5;

/// Measured quantity the indicator can display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Temperature,
    Humidity,
    Co2,
    Power,
    Gas,
}

impl MetricKind {
    /// All kinds in ordinal order
    pub const ALL: [MetricKind; METRIC_COUNT] = [
        MetricKind::Temperature,
        MetricKind::Humidity,
        MetricKind::Co2,
        MetricKind::Power,
        MetricKind::Gas,
    ];

    /// Dashboard ordinal, 1-based (1=Temperature .. 5=Gas)
    pub fn ordinal(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Look up a kind by its dashboard ordinal
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            1..=5 => Some(Self::ALL[ordinal as usize - 1]),
            _ => None,
        }
    }

    /// Zero-based table index
    pub fn index(self) -> usize {
        match self {
            MetricKind::Temperature => 0,
            MetricKind::Humidity => 1,
            MetricKind::Co2 => 2,
            MetricKind::Power => 3,
            MetricKind::Gas => 4,
        }
    }

    /// Topic segment for this metric
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::Humidity => "humidity",
            MetricKind::Co2 => "co2",
            MetricKind::Power => "power",
            MetricKind::Gas => "gas",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn unit(self) -> &'static str {
        match self {
            MetricKind::Temperature => "°C",
            MetricKind::Humidity => "%",
            MetricKind::Co2 => "ppm",
            MetricKind::Power => "W",
            MetricKind::Gas => "idx",
        }
    }

    /// Humidity, CO2 and gas are published as whole numbers
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            MetricKind::Humidity | MetricKind::Co2 | MetricKind::Gas
        )
    }
}

/// Why a telemetry or control payload was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    /// Payload is not valid UTF-8
    Encoding,
    /// Payload text is not a decimal number
    NotANumber,
    /// Parsed to NaN or infinity
    NotFinite,
}

/// Parse the decimal ASCII text of a value.
///
/// Surrounding whitespace and a trailing NUL are tolerated since some
/// publishers include the C string terminator.
pub fn parse_value(payload: &[u8]) -> Result<f32, PayloadError> {
    let text = core::str::from_utf8(payload).map_err(|_| PayloadError::Encoding)?;
    let text = text.trim_end_matches('\0').trim();

    let value: f32 = text.parse().map_err(|_| PayloadError::NotANumber)?;
    if !value.is_finite() {
        return Err(PayloadError::NotFinite);
    }

    Ok(value)
}

//! Barrier marker types.

/// State of a barrier marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierStatus {
    /// The effect is running or crashed mid-way.
    Pending,
    /// The effect completed.
    Applied,
    /// Written on the action key by a compensation that ran first.
    Voided,
}

impl BarrierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarrierStatus::Pending => "pending",
            BarrierStatus::Applied => "applied",
            BarrierStatus::Voided => "voided",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BarrierStatus::Pending),
            "applied" => Some(BarrierStatus::Applied),
            "voided" => Some(BarrierStatus::Voided),
            _ => None,
        }
    }
}

impl std::fmt::Display for BarrierStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a conditional marker insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// No marker existed; the requested one was written.
    Inserted,
    /// A marker already existed and was left as is.
    Existing(BarrierStatus),
}

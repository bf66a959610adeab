//! Shared domain vocabulary: organs, blood types, statuses, timestamps
use chrono::{DateTime, TimeZone, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum OrganType {
    #[n(0)]
    Heart,
    #[n(1)]
    Lungs,
    #[n(2)]
    Liver,
    #[n(3)]
    Kidneys,
    #[n(4)]
    Pancreas,
    #[n(5)]
    Intestines,
    #[n(6)]
    Corneas,
    #[n(7)]
    Skin,
    #[n(8)]
    Bone,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum BloodType {
    #[n(0)]
    APos,
    #[n(1)]
    ANeg,
    #[n(2)]
    BPos,
    #[n(3)]
    BNeg,
    #[n(4)]
    AbPos,
    #[n(5)]
    AbNeg,
    #[n(6)]
    OPos,
    #[n(7)]
    ONeg,
}

impl BloodType {
    /// Standard donor-to-recipient compatibility table. O- donates to
    /// everyone, AB+ receives from everyone.
    pub fn can_donate_to(self, recipient: BloodType) -> bool {
        use BloodType::*;
        match self {
            ONeg => true,
            OPos => matches!(recipient, OPos | APos | BPos | AbPos),
            ANeg => matches!(recipient, ANeg | APos | AbNeg | AbPos),
            APos => matches!(recipient, APos | AbPos),
            BNeg => matches!(recipient, BNeg | BPos | AbNeg | AbPos),
            BPos => matches!(recipient, BPos | AbPos),
            AbNeg => matches!(recipient, AbNeg | AbPos),
            AbPos => matches!(recipient, AbPos),
        }
    }

    /// ABO group ignoring the Rh factor, e.g. A+ and A- share a group.
    pub fn abo_group(self) -> u8 {
        use BloodType::*;
        match self {
            APos | ANeg => 0,
            BPos | BNeg => 1,
            AbPos | AbNeg => 2,
            OPos | ONeg => 3,
        }
    }
}

/// Request lifecycle. Transitions are monotonic:
/// Pending -> Matched -> Allocated -> Closed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum RequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Matched,
    #[n(2)]
    Allocated,
    #[n(3)]
    Closed,
}

/// Case lifecycle labels recorded in the status chain.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum CaseStatus {
    #[n(0)]
    Initiated,
    #[n(1)]
    RecoveryCompleted,
    #[n(2)]
    Completed,
    #[n(3)]
    Cancelled,
}

impl CaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CaseStatus::Completed | CaseStatus::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            CaseStatus::Initiated => "Initiated",
            CaseStatus::RecoveryCompleted => "RecoveryCompleted",
            CaseStatus::Completed => "Completed",
            CaseStatus::Cancelled => "Cancelled",
        }
    }
}

/// Optional geolocation attached to a status event.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct GeoPoint {
    #[n(0)]
    pub lat: f64,
    #[n(1)]
    pub lng: f64,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

//! Trace identity shared between the tracer, propagators and log correlation.
//!
//! The SDK owns span lifecycles; this module only describes *which* span is
//! active ([`SpanContext`]) and how a [`Context`](crate::Context) carries it
//! ([`TraceContextExt`]).
use std::borrow::Cow;
use std::fmt;
use std::num::ParseIntError;

mod context;
pub use context::{ContextSpan, TraceContextExt};

/// A 16-byte value which identifies a given trace.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid trace id
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Return the representation of this trace id as a byte array.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a trace id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value which identifies a given span.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Return the representation of this span id as a byte array.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a span id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Flags that can be set on a [`SpanContext`].
///
/// Only the sampled bit is defined by W3C trace context version 00.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Trace flags with the `sampled` flag set to `0`.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// Trace flags with the `sampled` flag set to `1`.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Construct new trace flags
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the `sampled` flag is set
    pub fn is_sampled(&self) -> bool {
        (*self & TraceFlags::SAMPLED) == TraceFlags::SAMPLED
    }

    /// Returns copy of the current flags with the `sampled` flag set.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            *self | TraceFlags::SAMPLED
        } else {
            *self & !TraceFlags::SAMPLED
        }
    }

    /// Returns the flags as a `u8`
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl std::ops::BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl std::ops::BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::Not for TraceFlags {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Immutable portion of a span which can be serialized and propagated.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
}

impl SpanContext {
    /// An invalid span context
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
    };

    /// Create an invalid empty span context
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Construct a new `SpanContext`
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_flags: TraceFlags, is_remote: bool) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
        }
    }

    /// The [`TraceId`] for this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] for this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Returns details about the trace.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if the span context has a valid (non-zero) `trace_id`
    /// and a valid (non-zero) `span_id`.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if the span context was propagated from a remote parent.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }
}

/// The status of a span.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error
        description: Cow<'static, str>,
    },

    /// The operation has been validated by an application developer or
    /// operator to have completed successfully.
    Ok,
}

impl Status {
    /// Create a new error status with a given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }

    /// Ok outranks error, error outranks unset.
    fn rank(&self) -> u8 {
        match self {
            Status::Unset => 0,
            Status::Error { .. } => 1,
            Status::Ok => 2,
        }
    }

    /// Returns `true` when `self` may be replaced by `other`.
    pub fn can_be_replaced_by(&self, other: &Status) -> bool {
        other.rank() >= self.rank() && !matches!(self, Status::Ok)
    }
}

/// The relationship between a span and its parent and children.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Server-side handling of a remote request.
    Server,
    /// A request to a remote service.
    Client,
    /// Initiator of an asynchronous request.
    Producer,
    /// Child of an asynchronous producer request.
    Consumer,
    /// Internal operation within an application.
    #[default]
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TraceId(0), "00000000000000000000000000000000")]
    #[case(TraceId(42), "0000000000000000000000000000002a")]
    #[case(TraceId(126642714606581564793456114182061442190), "5f467fe7bf42676c05e20ba4a90e448e")]
    fn trace_id_hex(#[case] id: TraceId, #[case] hex: &str) {
        assert_eq!(id.to_string(), hex);
        assert_eq!(TraceId::from_hex(hex).unwrap(), id);
    }

    #[rstest]
    #[case(SpanId(0), "0000000000000000")]
    #[case(SpanId(42), "000000000000002a")]
    #[case(SpanId(5508496025762705295), "4c721bf33e3caf8f")]
    fn span_id_hex(#[case] id: SpanId, #[case] hex: &str) {
        assert_eq!(id.to_string(), hex);
        assert_eq!(SpanId::from_hex(hex).unwrap(), id);
    }

    #[test]
    fn bytes_round_trip() {
        let trace_id = TraceId::from(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10u128);
        assert_eq!(TraceId::from_bytes(trace_id.to_bytes()), trace_id);
        assert_eq!(trace_id.to_bytes()[0], 0x01);
        let span_id = SpanId::from(0x0102_0304_0506_0708u64);
        assert_eq!(SpanId::from_bytes(span_id.to_bytes()), span_id);
    }

    #[test]
    fn sampled_flag() {
        assert!(TraceFlags::SAMPLED.is_sampled());
        assert!(!TraceFlags::NOT_SAMPLED.is_sampled());
        assert!(TraceFlags::new(0x03).is_sampled());
        assert_eq!(TraceFlags::new(0x03).with_sampled(false), TraceFlags::new(0x02));
    }

    #[test]
    fn span_context_validity() {
        assert!(!SpanContext::empty_context().is_valid());
        let sc = SpanContext::new(TraceId::from(1u128), SpanId::INVALID, TraceFlags::SAMPLED, false);
        assert!(!sc.is_valid());
        let sc = SpanContext::new(TraceId::from(1u128), SpanId::from(1u64), TraceFlags::SAMPLED, false);
        assert!(sc.is_valid());
    }

    #[test]
    fn status_ordering() {
        assert!(Status::Unset.can_be_replaced_by(&Status::error("boom")));
        assert!(Status::error("a").can_be_replaced_by(&Status::error("b")));
        assert!(Status::error("a").can_be_replaced_by(&Status::Ok));
        assert!(!Status::error("a").can_be_replaced_by(&Status::Unset));
        assert!(!Status::Ok.can_be_replaced_by(&Status::error("late")));
    }
}

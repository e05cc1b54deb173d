//! Result codes for the organize pipelines.

use std::fmt;

use ember_pow::difficulty::CompactError;
use ember_storage::StoreError;

/// Header rule violations reported by the header validator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HeaderError {
    /// Proof hash does not meet the target declared by the compact bits.
    InvalidProofOfWork,
    /// Compact bits field is malformed or above the proof-of-work limit.
    InvalidTarget,
    /// Compact bits disagree with the retarget schedule.
    IncorrectTarget,
    /// Timestamp is too far ahead of wall-clock time.
    FuturisticTimestamp,
    /// Timestamp is not beyond the median of recent headers.
    TimestampTooEarly,
    /// Version is below the floor activated at this height.
    InvalidVersion,
    /// An ancestor of this header was previously marked invalid.
    InvalidatedAncestor,
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::InvalidProofOfWork => write!(f, "proof of work does not meet target"),
            HeaderError::InvalidTarget => write!(f, "compact target is invalid"),
            HeaderError::IncorrectTarget => write!(f, "compact target disagrees with retarget"),
            HeaderError::FuturisticTimestamp => write!(f, "timestamp too far in the future"),
            HeaderError::TimestampTooEarly => write!(f, "timestamp not past median time"),
            HeaderError::InvalidVersion => write!(f, "version below activation floor"),
            HeaderError::InvalidatedAncestor => write!(f, "ancestor previously invalidated"),
        }
    }
}

impl std::error::Error for HeaderError {}

/// Transaction rule violations reported by the transaction validator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionError {
    /// No inputs or no outputs.
    EmptyTransaction,
    /// A non-coinbase input references the null outpoint.
    NullInput,
    /// Coinbase transactions are not accepted into the pool.
    Coinbase,
    /// An output value or the output sum is outside monetary bounds.
    ValueOutOfRange,
    /// Two inputs spend the same outpoint.
    DuplicateInput,
    /// Serialized size exceeds the network limit.
    OversizedTransaction,
    /// A script exceeds the network size limit.
    OversizedScript,
    /// A referenced output is unknown to the store.
    MissingInput,
    /// Input value does not cover output value.
    NegativeFee,
    /// Locktime forbids inclusion at the next height.
    NonFinal,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::EmptyTransaction => write!(f, "transaction has no inputs or outputs"),
            TransactionError::NullInput => write!(f, "input references the null outpoint"),
            TransactionError::Coinbase => write!(f, "coinbase not valid in the pool"),
            TransactionError::ValueOutOfRange => write!(f, "value out of range"),
            TransactionError::DuplicateInput => write!(f, "duplicate input"),
            TransactionError::OversizedTransaction => write!(f, "transaction exceeds size limit"),
            TransactionError::OversizedScript => write!(f, "script exceeds size limit"),
            TransactionError::MissingInput => write!(f, "missing input"),
            TransactionError::NegativeFee => write!(f, "inputs do not cover outputs"),
            TransactionError::NonFinal => write!(f, "locktime is not final"),
        }
    }
}

impl std::error::Error for TransactionError {}

/// Terminal outcome of an organize call, excluding success.
#[derive(Debug)]
pub enum ChainError {
    /// Header already indexed or pooled, or its parent is unknown.
    DuplicateBlock,
    /// Branch is well formed but does not out-work the candidate chain.
    InsufficientWork,
    /// Transaction already pooled or stored.
    DuplicateTransaction,
    /// Paid fee below the configured floor.
    InsufficientFee,
    /// An output is below the dust threshold.
    DustyTransaction,
    /// The organizer is stopped; retry after restart.
    ServiceStopped,
    /// A store read that must succeed did not; the store is suspect.
    OperationFailed,
    Header(HeaderError),
    Transaction(TransactionError),
    Store(StoreError),
}

impl ChainError {
    /// Fatal errors imply a corrupted store and no recovery path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::OperationFailed | ChainError::Store(_))
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::DuplicateBlock => write!(f, "duplicate block"),
            ChainError::InsufficientWork => write!(f, "insufficient work"),
            ChainError::DuplicateTransaction => write!(f, "duplicate transaction"),
            ChainError::InsufficientFee => write!(f, "insufficient fee"),
            ChainError::DustyTransaction => write!(f, "dusty transaction"),
            ChainError::ServiceStopped => write!(f, "service stopped"),
            ChainError::OperationFailed => write!(f, "operation failed"),
            ChainError::Header(err) => write!(f, "{err}"),
            ChainError::Transaction(err) => write!(f, "{err}"),
            ChainError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl PartialEq for ChainError {
    fn eq(&self, other: &Self) -> bool {
        use ChainError::*;
        match (self, other) {
            (DuplicateBlock, DuplicateBlock)
            | (InsufficientWork, InsufficientWork)
            | (DuplicateTransaction, DuplicateTransaction)
            | (InsufficientFee, InsufficientFee)
            | (DustyTransaction, DustyTransaction)
            | (ServiceStopped, ServiceStopped)
            | (OperationFailed, OperationFailed)
            | (Store(_), Store(_)) => true,
            (Header(left), Header(right)) => left == right,
            (Transaction(left), Transaction(right)) => left == right,
            _ => false,
        }
    }
}

impl From<HeaderError> for ChainError {
    fn from(err: HeaderError) -> Self {
        ChainError::Header(err)
    }
}

impl From<TransactionError> for ChainError {
    fn from(err: TransactionError) -> Self {
        ChainError::Transaction(err)
    }
}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        ChainError::Store(err)
    }
}

impl From<CompactError> for ChainError {
    fn from(_: CompactError) -> Self {
        ChainError::Header(HeaderError::InvalidTarget)
    }
}

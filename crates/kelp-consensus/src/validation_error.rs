use clvmr::allocator::{Allocator, Atom, NodePtr, SExp};
use clvmr::error::EvalErr;
use thiserror::Error;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    #[default]
    Unknown,
    InvalidSpendBundle,
    DuplicateOutput,
    DoubleSpend,
    UnknownUnspent,
    BadAggregateSignature,
    WrongPuzzleHash,
    InvalidCondition,
    InvalidConditionOpcode,
    InvalidParentId,
    InvalidPuzzleHash,
    InvalidPublicKey,
    InvalidMessage,
    InvalidCoinAmount,
    AssertMyCoinIdFailed,
    AssertHeightRelativeFailed,
    AssertHeightAbsoluteFailed,
    AssertSecondsAbsoluteFailed,
    AssertSecondsRelativeFailed,
    CoinAmountExceedsMaximum,
    CoinAmountNegative,
    InvalidFeeLowFee,
    InvalidFeeTooCloseToZero,
    MempoolConflict,
    MempoolNotInitialized,
    AlreadyIncludingTransaction,
    MintingCoin,
    ReserveFeeConditionFailed,
    /// The reported cost exceeded the limit it ran under (a single spend
    /// bundle runs under the block cost limit scaled by the mempool's limit
    /// factor).
    CostExceeded,
    AssertMyParentIdFailed,
    AssertMyPuzzleHashFailed,
    AssertMyAmountFailed,
    AssertMyBirthSecondsFailed,
    AssertMyBirthHeightFailed,
    GeneratorRuntimeError,
    InternalProtocolError,
    AssertBeforeSecondsAbsoluteFailed,
    AssertBeforeSecondsRelativeFailed,
    AssertBeforeHeightAbsoluteFailed,
    AssertBeforeHeightRelativeFailed,
    ImpossibleSecondsRelativeConstraints,
    ImpossibleSecondsAbsoluteConstraints,
    ImpossibleHeightRelativeConstraints,
    ImpossibleHeightAbsoluteConstraints,
    EphemeralRelativeCondition,
    InvalidSoftforkCondition,
    InvalidSoftforkCost,
    InvalidCoinId,
}

impl From<ErrorCode> for u32 {
    fn from(err: ErrorCode) -> u32 {
        match err {
            ErrorCode::Unknown => 1,
            ErrorCode::DuplicateOutput => 4,
            ErrorCode::DoubleSpend => 5,
            ErrorCode::UnknownUnspent => 6,
            ErrorCode::BadAggregateSignature => 7,
            ErrorCode::WrongPuzzleHash => 8,
            ErrorCode::InvalidCondition
            | ErrorCode::InvalidConditionOpcode
            | ErrorCode::InvalidParentId
            | ErrorCode::InvalidPuzzleHash
            | ErrorCode::InvalidPublicKey
            | ErrorCode::InvalidMessage
            | ErrorCode::InvalidCoinAmount => 10,
            ErrorCode::AssertMyCoinIdFailed => 11,
            ErrorCode::AssertHeightRelativeFailed => 13,
            ErrorCode::AssertHeightAbsoluteFailed => 14,
            ErrorCode::AssertSecondsAbsoluteFailed => 15,
            ErrorCode::CoinAmountExceedsMaximum => 16,
            ErrorCode::InvalidFeeLowFee => 18,
            ErrorCode::MempoolConflict => 19,
            ErrorCode::MintingCoin => 20,
            ErrorCode::CostExceeded => 23,
            ErrorCode::ReserveFeeConditionFailed => 48,
            ErrorCode::MempoolNotInitialized => 94,
            ErrorCode::AssertSecondsRelativeFailed => 105,
            ErrorCode::AlreadyIncludingTransaction => 109,
            ErrorCode::AssertMyParentIdFailed => 114,
            ErrorCode::AssertMyPuzzleHashFailed => 115,
            ErrorCode::AssertMyAmountFailed => 116,
            ErrorCode::GeneratorRuntimeError => 117,
            ErrorCode::InvalidFeeTooCloseToZero => 123,
            ErrorCode::CoinAmountNegative => 124,
            ErrorCode::InternalProtocolError => 125,
            ErrorCode::InvalidSpendBundle => 126,
            ErrorCode::AssertBeforeSecondsAbsoluteFailed => 128,
            ErrorCode::AssertBeforeSecondsRelativeFailed => 129,
            ErrorCode::AssertBeforeHeightAbsoluteFailed => 130,
            ErrorCode::AssertBeforeHeightRelativeFailed => 131,
            ErrorCode::ImpossibleSecondsRelativeConstraints => 134,
            ErrorCode::ImpossibleSecondsAbsoluteConstraints => 135,
            ErrorCode::ImpossibleHeightRelativeConstraints => 136,
            ErrorCode::ImpossibleHeightAbsoluteConstraints => 137,
            ErrorCode::AssertMyBirthSecondsFailed => 138,
            ErrorCode::AssertMyBirthHeightFailed => 139,
            ErrorCode::EphemeralRelativeCondition => 141,
            ErrorCode::InvalidSoftforkCondition => 142,
            ErrorCode::InvalidSoftforkCost => 143,
            ErrorCode::InvalidCoinId => 146,
        }
    }
}

/// A validation failure: the node (if any) the failure was detected at, and
/// the error code describing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("validation error: {1:?}")]
pub struct ValidationErr(pub NodePtr, pub ErrorCode);

impl From<EvalErr> for ValidationErr {
    fn from(v: EvalErr) -> Self {
        match v {
            EvalErr::CostExceeded => ValidationErr(NodePtr::NIL, ErrorCode::CostExceeded),
            other => ValidationErr(other.node_ptr(), ErrorCode::GeneratorRuntimeError),
        }
    }
}

impl From<std::io::Error> for ValidationErr {
    fn from(_: std::io::Error) -> Self {
        ValidationErr(NodePtr::NIL, ErrorCode::GeneratorRuntimeError)
    }
}

// helper functions that fail with ValidationErr

pub fn first(a: &Allocator, n: NodePtr) -> Result<NodePtr, ValidationErr> {
    match a.sexp(n) {
        SExp::Pair(left, _) => Ok(left),
        SExp::Atom => Err(ValidationErr(n, ErrorCode::InvalidCondition)),
    }
}

pub fn rest(a: &Allocator, n: NodePtr) -> Result<NodePtr, ValidationErr> {
    match a.sexp(n) {
        SExp::Pair(_, right) => Ok(right),
        SExp::Atom => Err(ValidationErr(n, ErrorCode::InvalidCondition)),
    }
}

pub fn next(a: &Allocator, n: NodePtr) -> Result<Option<(NodePtr, NodePtr)>, ValidationErr> {
    match a.sexp(n) {
        SExp::Pair(left, right) => Ok(Some((left, right))),
        SExp::Atom => {
            // this is expected to be a valid list terminator
            if a.atom_len(n) == 0 {
                Ok(None)
            } else {
                Err(ValidationErr(n, ErrorCode::InvalidCondition))
            }
        }
    }
}

pub fn atom(a: &Allocator, n: NodePtr, code: ErrorCode) -> Result<Atom<'_>, ValidationErr> {
    match a.sexp(n) {
        SExp::Atom => Ok(a.atom(n)),
        SExp::Pair(..) => Err(ValidationErr(n, code)),
    }
}

pub fn check_nil(a: &Allocator, n: NodePtr) -> Result<(), ValidationErr> {
    if atom(a, n, ErrorCode::InvalidCondition)?.as_ref().is_empty() {
        Ok(())
    } else {
        Err(ValidationErr(n, ErrorCode::InvalidCondition))
    }
}

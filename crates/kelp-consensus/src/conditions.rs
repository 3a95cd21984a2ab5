use crate::coin_id::compute_coin_id;
use crate::consensus_constants::ConsensusConstants;
use crate::flags::{NO_UNKNOWN_CONDS, STRICT_ARGS_COUNT};
use crate::opcodes::{
    compute_unknown_condition_cost, parse_opcode, ConditionOpcode, AGG_SIG_AMOUNT, AGG_SIG_COST,
    AGG_SIG_ME, AGG_SIG_PARENT, AGG_SIG_PARENT_AMOUNT, AGG_SIG_PARENT_PUZZLE, AGG_SIG_PUZZLE,
    AGG_SIG_PUZZLE_AMOUNT, AGG_SIG_UNSAFE, ASSERT_BEFORE_HEIGHT_ABSOLUTE,
    ASSERT_BEFORE_HEIGHT_RELATIVE, ASSERT_BEFORE_SECONDS_ABSOLUTE, ASSERT_BEFORE_SECONDS_RELATIVE,
    ASSERT_HEIGHT_ABSOLUTE, ASSERT_HEIGHT_RELATIVE, ASSERT_MY_AMOUNT, ASSERT_MY_BIRTH_HEIGHT,
    ASSERT_MY_BIRTH_SECONDS, ASSERT_MY_COIN_ID, ASSERT_MY_PARENT_ID, ASSERT_MY_PUZZLEHASH,
    ASSERT_SECONDS_ABSOLUTE, ASSERT_SECONDS_RELATIVE, CREATE_COIN, CREATE_COIN_COST, REMARK,
    RESERVE_FEE, SOFTFORK,
};
use crate::sanitize::{
    parse_amount, sanitize_hash, sanitize_message, sanitize_uint, SanitizedUint,
};
use crate::validation_error::{check_nil, first, next, rest, ErrorCode, ValidationErr};
use chia_bls::PublicKey;
use clvmr::allocator::{Allocator, NodePtr, SExp};
use clvmr::cost::Cost;
use kelp_protocol::Bytes32;
use std::cmp::{max, min};
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// spend flags

// If the spend contained *any* relative seconds or height condition, this
// flag is set
pub const HAS_RELATIVE_CONDITION: u32 = 1;

// If the spend is eligible for fast-forward, this flag is set. A spend is
// eligible if:
// 1. the input coin amount is odd
// 2. There are no AGG_SIG_ME, AGG_SIG_PARENT, AGG_SIG_PARENT_* conditions
// 3. No ASSERT_MY_COIN_ID condition, no more than one ASSERT_MY_PARENT_ID
//    condition (as the second condition)
// 4. it has an output coin with the same puzzle hash as the spend itself
pub const ELIGIBLE_FOR_FF: u32 = 2;

// The structure of conditions, returned from a puzzle program, is a list of
// lists:

// (<condition-opcode> <arg1> <arg2> ...)

// different conditions have different number and types of arguments.

#[derive(Debug)]
pub enum Condition {
    // pubkey (48 bytes) and message (<= 1024 bytes)
    AggSigUnsafe(NodePtr, NodePtr),
    AggSigMe(NodePtr, NodePtr),
    AggSigParent(NodePtr, NodePtr),
    AggSigPuzzle(NodePtr, NodePtr),
    AggSigAmount(NodePtr, NodePtr),
    AggSigPuzzleAmount(NodePtr, NodePtr),
    AggSigParentAmount(NodePtr, NodePtr),
    AggSigParentPuzzle(NodePtr, NodePtr),
    // puzzle hash (32 bytes), amount, hint is an optional hash (32 bytes),
    // may be left as nil
    CreateCoin(NodePtr, u64, NodePtr),
    // amount
    ReserveFee(u64),
    // ID (hash, 32 bytes)
    AssertMyCoinId(NodePtr),
    AssertMyParentId(NodePtr),
    AssertMyPuzzlehash(NodePtr),
    // amount
    AssertMyAmount(u64),
    // seconds
    AssertMyBirthSeconds(u64),
    // block height
    AssertMyBirthHeight(u32),
    // seconds
    AssertSecondsRelative(u64),
    AssertSecondsAbsolute(u64),
    // block height
    AssertHeightRelative(u32),
    AssertHeightAbsolute(u32),
    // seconds
    AssertBeforeSecondsRelative(u64),
    AssertBeforeSecondsAbsolute(u64),
    // block height
    AssertBeforeHeightRelative(u32),
    AssertBeforeHeightAbsolute(u32),

    // The softfork condition is one that we don't understand, it just applies
    // the specified cost
    Softfork(Cost),

    // this means the condition is unconditionally true and can be skipped
    Skip,
    SkipRelativeCondition,
}

fn check_agg_sig_unsafe_message(
    a: &Allocator,
    msg: NodePtr,
    constants: &ConsensusConstants,
) -> Result<(), ValidationErr> {
    if a.atom_len(msg) < 32 {
        return Ok(());
    }
    let buf = a.atom(msg);
    for additional_data in &[
        constants.agg_sig_me_additional_data.as_ref(),
        constants.agg_sig_parent_additional_data.as_ref(),
        constants.agg_sig_puzzle_additional_data.as_ref(),
        constants.agg_sig_amount_additional_data.as_ref(),
        constants.agg_sig_puzzle_amount_additional_data.as_ref(),
        constants.agg_sig_parent_amount_additional_data.as_ref(),
        constants.agg_sig_parent_puzzle_additional_data.as_ref(),
    ] {
        if buf.as_ref().ends_with(additional_data) {
            return Err(ValidationErr(msg, ErrorCode::InvalidMessage));
        }
    }
    Ok(())
}

fn maybe_check_args_terminator(
    a: &Allocator,
    arg: NodePtr,
    flags: u32,
) -> Result<(), ValidationErr> {
    if (flags & STRICT_ARGS_COUNT) != 0 {
        check_nil(a, rest(a, arg)?)?;
    }
    Ok(())
}

pub fn parse_args(
    a: &Allocator,
    mut c: NodePtr,
    op: ConditionOpcode,
    flags: u32,
) -> Result<Condition, ValidationErr> {
    match op {
        AGG_SIG_UNSAFE
        | AGG_SIG_ME
        | AGG_SIG_PUZZLE
        | AGG_SIG_PUZZLE_AMOUNT
        | AGG_SIG_PARENT
        | AGG_SIG_AMOUNT
        | AGG_SIG_PARENT_PUZZLE
        | AGG_SIG_PARENT_AMOUNT => {
            let pubkey = sanitize_hash(a, first(a, c)?, 48, ErrorCode::InvalidPublicKey)?;
            c = rest(a, c)?;
            let message = sanitize_message(a, first(a, c)?, ErrorCode::InvalidMessage)?;
            // AGG_SIG_* take two parameters
            if (flags & STRICT_ARGS_COUNT) != 0 {
                check_nil(a, rest(a, c)?)?;
            }
            match op {
                AGG_SIG_UNSAFE => Ok(Condition::AggSigUnsafe(pubkey, message)),
                AGG_SIG_ME => Ok(Condition::AggSigMe(pubkey, message)),
                AGG_SIG_PARENT => Ok(Condition::AggSigParent(pubkey, message)),
                AGG_SIG_PUZZLE => Ok(Condition::AggSigPuzzle(pubkey, message)),
                AGG_SIG_AMOUNT => Ok(Condition::AggSigAmount(pubkey, message)),
                AGG_SIG_PUZZLE_AMOUNT => Ok(Condition::AggSigPuzzleAmount(pubkey, message)),
                AGG_SIG_PARENT_AMOUNT => Ok(Condition::AggSigParentAmount(pubkey, message)),
                AGG_SIG_PARENT_PUZZLE => Ok(Condition::AggSigParentPuzzle(pubkey, message)),
                _ => Err(ValidationErr(c, ErrorCode::InternalProtocolError)),
            }
        }
        CREATE_COIN => {
            let puzzle_hash = sanitize_hash(a, first(a, c)?, 32, ErrorCode::InvalidPuzzleHash)?;
            c = rest(a, c)?;
            let node = first(a, c)?;
            let amount = match sanitize_uint(a, node, 8, ErrorCode::InvalidCoinAmount)? {
                SanitizedUint::PositiveOverflow => {
                    return Err(ValidationErr(node, ErrorCode::CoinAmountExceedsMaximum));
                }
                SanitizedUint::NegativeOverflow => {
                    return Err(ValidationErr(node, ErrorCode::CoinAmountNegative));
                }
                SanitizedUint::Ok(amount) => amount,
            };
            // CREATE_COIN takes an optional 3rd parameter, which is a list of
            // byte buffers (typically a 32 byte hash). We only pull out the
            // first element.

            // we always expect one more item, even if it's the zero-terminator
            c = rest(a, c)?;

            // there was another item in the list
            if let Ok(params) = first(a, c) {
                // the item was a cons-box, and params is the left-hand
                // side, the list element
                maybe_check_args_terminator(a, c, flags)?;
                if let Ok(param) = first(a, params) {
                    // pull out the first item (param)
                    if let SExp::Atom = a.sexp(param) {
                        if a.atom_len(param) <= 32 {
                            return Ok(Condition::CreateCoin(puzzle_hash, amount, param));
                        }
                    }
                }
            } else if (flags & STRICT_ARGS_COUNT) != 0 {
                check_nil(a, c)?;
            }
            Ok(Condition::CreateCoin(puzzle_hash, amount, a.nil()))
        }
        SOFTFORK => {
            if (flags & NO_UNKNOWN_CONDS) != 0 {
                // We don't know of any new softforked-in conditions, so they
                // are all unknown
                Err(ValidationErr(c, ErrorCode::InvalidConditionOpcode))
            } else {
                match sanitize_uint(a, first(a, c)?, 4, ErrorCode::InvalidSoftforkCost)? {
                    // the first argument represents the cost of the condition.
                    // We scale it by 10000 to make the argument be a bit
                    // smaller
                    SanitizedUint::Ok(cost) => Ok(Condition::Softfork(cost * 10000)),
                    _ => Err(ValidationErr(c, ErrorCode::InvalidSoftforkCost)),
                }
            }
        }
        256..=65535 => {
            // All of these conditions are unknown, but they have costs
            if (flags & NO_UNKNOWN_CONDS) != 0 {
                Err(ValidationErr(c, ErrorCode::InvalidConditionOpcode))
            } else {
                Ok(Condition::Softfork(compute_unknown_condition_cost(op)))
            }
        }
        RESERVE_FEE => {
            maybe_check_args_terminator(a, c, flags)?;
            let fee = parse_amount(a, first(a, c)?, ErrorCode::ReserveFeeConditionFailed)?;
            Ok(Condition::ReserveFee(fee))
        }
        ASSERT_MY_COIN_ID => {
            maybe_check_args_terminator(a, c, flags)?;
            let id = sanitize_hash(a, first(a, c)?, 32, ErrorCode::AssertMyCoinIdFailed)?;
            Ok(Condition::AssertMyCoinId(id))
        }
        ASSERT_MY_PARENT_ID => {
            maybe_check_args_terminator(a, c, flags)?;
            let id = sanitize_hash(a, first(a, c)?, 32, ErrorCode::AssertMyParentIdFailed)?;
            Ok(Condition::AssertMyParentId(id))
        }
        ASSERT_MY_PUZZLEHASH => {
            maybe_check_args_terminator(a, c, flags)?;
            let id = sanitize_hash(a, first(a, c)?, 32, ErrorCode::AssertMyPuzzleHashFailed)?;
            Ok(Condition::AssertMyPuzzlehash(id))
        }
        ASSERT_MY_AMOUNT => {
            maybe_check_args_terminator(a, c, flags)?;
            let amount = parse_amount(a, first(a, c)?, ErrorCode::AssertMyAmountFailed)?;
            Ok(Condition::AssertMyAmount(amount))
        }
        ASSERT_MY_BIRTH_SECONDS => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertMyBirthSecondsFailed;
            match sanitize_uint(a, node, 8, code)? {
                SanitizedUint::PositiveOverflow | SanitizedUint::NegativeOverflow => {
                    Err(ValidationErr(node, code))
                }
                SanitizedUint::Ok(r) => Ok(Condition::AssertMyBirthSeconds(r)),
            }
        }
        ASSERT_MY_BIRTH_HEIGHT => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertMyBirthHeightFailed;
            match sanitize_uint(a, node, 4, code)? {
                SanitizedUint::PositiveOverflow | SanitizedUint::NegativeOverflow => {
                    Err(ValidationErr(node, code))
                }
                SanitizedUint::Ok(r) => Ok(Condition::AssertMyBirthHeight(r as u32)),
            }
        }
        ASSERT_SECONDS_RELATIVE => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertSecondsRelativeFailed;
            match sanitize_uint(a, node, 8, code)? {
                SanitizedUint::PositiveOverflow => Err(ValidationErr(node, code)),
                SanitizedUint::NegativeOverflow => Ok(Condition::SkipRelativeCondition),
                SanitizedUint::Ok(r) => Ok(Condition::AssertSecondsRelative(r)),
            }
        }
        ASSERT_SECONDS_ABSOLUTE => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertSecondsAbsoluteFailed;
            match sanitize_uint(a, node, 8, code)? {
                SanitizedUint::PositiveOverflow => Err(ValidationErr(node, code)),
                SanitizedUint::NegativeOverflow => Ok(Condition::Skip),
                SanitizedUint::Ok(r) => Ok(Condition::AssertSecondsAbsolute(r)),
            }
        }
        ASSERT_HEIGHT_RELATIVE => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertHeightRelativeFailed;
            match sanitize_uint(a, node, 4, code)? {
                SanitizedUint::PositiveOverflow => Err(ValidationErr(node, code)),
                SanitizedUint::NegativeOverflow => Ok(Condition::SkipRelativeCondition),
                SanitizedUint::Ok(r) => Ok(Condition::AssertHeightRelative(r as u32)),
            }
        }
        ASSERT_HEIGHT_ABSOLUTE => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertHeightAbsoluteFailed;
            match sanitize_uint(a, node, 4, code)? {
                SanitizedUint::PositiveOverflow => Err(ValidationErr(node, code)),
                SanitizedUint::NegativeOverflow => Ok(Condition::Skip),
                SanitizedUint::Ok(r) => Ok(Condition::AssertHeightAbsolute(r as u32)),
            }
        }
        ASSERT_BEFORE_SECONDS_RELATIVE => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertBeforeSecondsRelativeFailed;
            match sanitize_uint(a, node, 8, code)? {
                SanitizedUint::PositiveOverflow => Ok(Condition::SkipRelativeCondition),
                SanitizedUint::NegativeOverflow => Err(ValidationErr(node, code)),
                SanitizedUint::Ok(r) => Ok(Condition::AssertBeforeSecondsRelative(r)),
            }
        }
        ASSERT_BEFORE_SECONDS_ABSOLUTE => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertBeforeSecondsAbsoluteFailed;
            match sanitize_uint(a, node, 8, code)? {
                SanitizedUint::PositiveOverflow => Ok(Condition::Skip),
                SanitizedUint::NegativeOverflow => Err(ValidationErr(node, code)),
                SanitizedUint::Ok(r) => Ok(Condition::AssertBeforeSecondsAbsolute(r)),
            }
        }
        ASSERT_BEFORE_HEIGHT_RELATIVE => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertBeforeHeightRelativeFailed;
            match sanitize_uint(a, node, 4, code)? {
                SanitizedUint::PositiveOverflow => Ok(Condition::SkipRelativeCondition),
                SanitizedUint::NegativeOverflow => Err(ValidationErr(node, code)),
                SanitizedUint::Ok(r) => Ok(Condition::AssertBeforeHeightRelative(r as u32)),
            }
        }
        ASSERT_BEFORE_HEIGHT_ABSOLUTE => {
            maybe_check_args_terminator(a, c, flags)?;
            let node = first(a, c)?;
            let code = ErrorCode::AssertBeforeHeightAbsoluteFailed;
            match sanitize_uint(a, node, 4, code)? {
                SanitizedUint::PositiveOverflow => Ok(Condition::Skip),
                SanitizedUint::NegativeOverflow => Err(ValidationErr(node, code)),
                SanitizedUint::Ok(r) => Ok(Condition::AssertBeforeHeightAbsolute(r as u32)),
            }
        }
        REMARK => {
            // this condition is always true, we always ignore arguments
            Ok(Condition::Skip)
        }
        _ => Err(ValidationErr(c, ErrorCode::InvalidConditionOpcode)),
    }
}

#[derive(Debug, Clone)]
pub struct NewCoin {
    pub puzzle_hash: Bytes32,
    pub amount: u64,
    // the hint is optional. When not provided, this points to nil. The hint
    // is not part of the unique identity of a coin, it's not hashed when
    // computing the coin ID
    pub hint: NodePtr,
}

impl Hash for NewCoin {
    fn hash<H: Hasher>(&self, h: &mut H) {
        self.puzzle_hash.hash(h);
        self.amount.hash(h);
    }
}

impl Eq for NewCoin {}

impl PartialEq for NewCoin {
    fn eq(&self, lhs: &NewCoin) -> bool {
        self.amount == lhs.amount && self.puzzle_hash == lhs.puzzle_hash
    }
}

// These are all the conditions related directly to a specific spend.
#[derive(Debug, Clone)]
pub struct SpendConditions {
    // the parent coin ID of the coin being spent
    pub parent_id: NodePtr,
    // the amount of the coin that's being spent
    pub coin_amount: u64,
    // the puzzle hash of the coin being spent
    pub puzzle_hash: NodePtr,
    // the coin ID of the coin being spent. This is computed from parent_id,
    // coin_amount and puzzle_hash
    pub coin_id: Arc<Bytes32>,
    // conditions
    // all these integers are initialized to None, which also means "no
    // constraint".
    pub height_relative: Option<u32>,
    pub seconds_relative: Option<u64>,
    // the most restrictive ASSERT_BEFORE_HEIGHT_RELATIVE condition (if any)
    pub before_height_relative: Option<u32>,
    // the most restrictive ASSERT_BEFORE_SECONDS_RELATIVE condition (if any)
    pub before_seconds_relative: Option<u64>,
    // if the coin is asserting its birth height or timestamp, these are set
    pub birth_height: Option<u32>,
    pub birth_seconds: Option<u64>,
    // all coins created by this spend. Duplicates are consensus failures
    pub create_coin: HashSet<NewCoin>,
    // Agg Sig conditions per opcode
    pub agg_sig_me: Vec<(PublicKey, NodePtr)>,
    pub agg_sig_parent: Vec<(PublicKey, NodePtr)>,
    pub agg_sig_puzzle: Vec<(PublicKey, NodePtr)>,
    pub agg_sig_amount: Vec<(PublicKey, NodePtr)>,
    pub agg_sig_puzzle_amount: Vec<(PublicKey, NodePtr)>,
    pub agg_sig_parent_amount: Vec<(PublicKey, NodePtr)>,
    pub agg_sig_parent_puzzle: Vec<(PublicKey, NodePtr)>,
    // Flags describing properties of this spend. See flags above
    pub flags: u32,
}

impl SpendConditions {
    pub fn new(
        parent_id: NodePtr,
        coin_amount: u64,
        puzzle_hash: NodePtr,
        coin_id: Arc<Bytes32>,
    ) -> SpendConditions {
        // spends eligible for fast-forward must be singletons, which use odd
        // amounts. We'll clear this flag if any condition rules it out
        let flags = if (coin_amount & 1) == 1 {
            ELIGIBLE_FOR_FF
        } else {
            0
        };
        SpendConditions {
            parent_id,
            coin_amount,
            puzzle_hash,
            coin_id,
            height_relative: None,
            seconds_relative: None,
            before_height_relative: None,
            before_seconds_relative: None,
            birth_height: None,
            birth_seconds: None,
            create_coin: HashSet::new(),
            agg_sig_me: Vec::new(),
            agg_sig_parent: Vec::new(),
            agg_sig_puzzle: Vec::new(),
            agg_sig_amount: Vec::new(),
            agg_sig_puzzle_amount: Vec::new(),
            agg_sig_parent_amount: Vec::new(),
            agg_sig_parent_puzzle: Vec::new(),
            flags,
        }
    }
}

// these are all the conditions and properties of a complete spend bundle.
// some conditions that are created by individual spends are aggregated at the
// spend bundle level, like reserve_fee and absolute time locks. Other
// conditions are per spend, like relative time-locks and create coins
// (because they have an implied parent coin ID).
#[derive(Debug, Default)]
pub struct SpendBundleConditions {
    pub spends: Vec<SpendConditions>,
    // The sum of all reserve fee conditions
    pub reserve_fee: u64,
    // the highest height/time conditions (i.e. most strict). 0 values are
    // no-ops
    pub height_absolute: u32,
    pub seconds_absolute: u64,
    // Unsafe Agg Sig conditions (i.e. not tied to the spend generating it)
    pub agg_sig_unsafe: Vec<(PublicKey, NodePtr)>,
    // when set, this is the lowest (i.e. most restrictive) of all
    // ASSERT_BEFORE_HEIGHT_ABSOLUTE conditions
    pub before_height_absolute: Option<u32>,
    // ASSERT_BEFORE_SECONDS_ABSOLUTE conditions
    pub before_seconds_absolute: Option<u64>,

    // the cost of the bundle (CLVM execution and conditions)
    pub cost: u64,

    // the sum of all values of all spent coins
    pub removal_amount: u128,

    // the sum of all amounts of CREATE_COIN conditions
    pub addition_amount: u128,

    // true if the spend bundle aggregate signature was validated
    pub validated_signature: bool,
}

#[derive(Default, Debug)]
pub struct ParseState {
    // all coin IDs that have been spent so far. When we parse a spend we also
    // compute the coin ID, and stick it in this map. The value mapped to is
    // the index of the spend in SpendBundleConditions::spends
    spent_coins: HashMap<Arc<Bytes32>, usize>,

    // spends that use relative height- or time conditions are disallowed on
    // ephemeral coins. They are recorded in this set to be checked once all
    // spends have been parsed. These conditions are:
    // ASSERT_HEIGHT_RELATIVE
    // ASSERT_SECONDS_RELATIVE
    // ASSERT_BEFORE_HEIGHT_RELATIVE
    // ASSERT_BEFORE_SECONDS_RELATIVE
    // ASSERT_MY_BIRTH_SECONDS
    // ASSERT_MY_BIRTH_HEIGHT
    // each item is the index into the SpendBundleConditions::spends vector
    assert_not_ephemeral: HashSet<usize>,
}

/// Parse the (parent-id, puzzle-hash, amount, condition-list) quartet of one
/// spend.
pub fn parse_single_spend(
    a: &Allocator,
    mut spend: NodePtr,
) -> Result<(NodePtr, NodePtr, NodePtr, NodePtr), ValidationErr> {
    let parent_id = first(a, spend)?;
    spend = rest(a, spend)?;
    let puzzle_hash = first(a, spend)?;
    spend = rest(a, spend)?;
    let amount = first(a, spend)?;
    spend = rest(a, spend)?;
    let cond = first(a, spend)?;
    // the rest() here is spend-level extra fields. Typically nil
    Ok((parent_id, puzzle_hash, amount, cond))
}

#[allow(clippy::too_many_arguments)]
pub fn process_single_spend(
    a: &Allocator,
    ret: &mut SpendBundleConditions,
    state: &mut ParseState,
    parent_id: NodePtr,
    puzzle_hash: NodePtr,
    amount: NodePtr,
    conditions: NodePtr,
    flags: u32,
    max_cost: &mut Cost,
    constants: &ConsensusConstants,
) -> Result<(), ValidationErr> {
    let parent_id = sanitize_hash(a, parent_id, 32, ErrorCode::InvalidParentId)?;
    let puzzle_hash = sanitize_hash(a, puzzle_hash, 32, ErrorCode::InvalidPuzzleHash)?;
    let my_amount = parse_amount(a, amount, ErrorCode::InvalidCoinAmount)?;
    let amount_buf = a.atom(amount);

    let coin_id = Arc::new(compute_coin_id(
        a,
        parent_id,
        puzzle_hash,
        amount_buf.as_ref(),
    ));

    if state
        .spent_coins
        .insert(coin_id.clone(), ret.spends.len())
        .is_some()
    {
        // if this coin ID has already been added to this set, it's a double
        // spend
        return Err(ValidationErr(parent_id, ErrorCode::DoubleSpend));
    }

    ret.removal_amount += u128::from(my_amount);

    let spend = SpendConditions::new(parent_id, my_amount, puzzle_hash, coin_id);

    parse_conditions(a, ret, state, spend, conditions, flags, max_cost, constants)
}

fn assert_not_ephemeral(spend_flags: &mut u32, state: &mut ParseState, idx: usize) {
    if (*spend_flags & HAS_RELATIVE_CONDITION) != 0 {
        return;
    }

    state.assert_not_ephemeral.insert(idx);
    *spend_flags |= HAS_RELATIVE_CONDITION;
}

fn to_key(a: &Allocator, pk: NodePtr) -> Result<PublicKey, ValidationErr> {
    // parse_args() already sanitized the atom to 48 bytes
    let key = PublicKey::from_bytes(a.atom(pk).as_ref().try_into().expect("internal error"))
        .map_err(|_| ValidationErr(pk, ErrorCode::InvalidPublicKey))?;
    if key.is_inf() {
        Err(ValidationErr(pk, ErrorCode::InvalidPublicKey))
    } else {
        Ok(key)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn parse_conditions(
    a: &Allocator,
    ret: &mut SpendBundleConditions,
    state: &mut ParseState,
    mut spend: SpendConditions,
    mut iter: NodePtr,
    flags: u32,
    max_cost: &mut Cost,
    constants: &ConsensusConstants,
) -> Result<(), ValidationErr> {
    // The index of the condition within the spend, used for the fast-forward
    // eligibility rules
    let mut condition_counter: i32 = 0;

    while let Some((mut c, tail)) = next(a, iter)? {
        iter = tail;
        let Some(op) = parse_opcode(a, first(a, c)?) else {
            // in strict mode we don't allow unknown conditions
            if (flags & NO_UNKNOWN_CONDS) != 0 {
                return Err(ValidationErr(c, ErrorCode::InvalidConditionOpcode));
            }
            // in non-strict mode, we just ignore unknown conditions
            condition_counter += 1;
            continue;
        };

        // subtract the max_cost based on the current condition
        // in case we exceed the limit, we want to fail as early as possible
        match op {
            CREATE_COIN => {
                if *max_cost < CREATE_COIN_COST {
                    return Err(ValidationErr(c, ErrorCode::CostExceeded));
                }
                *max_cost -= CREATE_COIN_COST;
            }
            AGG_SIG_UNSAFE
            | AGG_SIG_ME
            | AGG_SIG_PUZZLE
            | AGG_SIG_PUZZLE_AMOUNT
            | AGG_SIG_PARENT
            | AGG_SIG_AMOUNT
            | AGG_SIG_PARENT_PUZZLE
            | AGG_SIG_PARENT_AMOUNT => {
                if *max_cost < AGG_SIG_COST {
                    return Err(ValidationErr(c, ErrorCode::CostExceeded));
                }
                *max_cost -= AGG_SIG_COST;
            }
            _ => (),
        }
        c = rest(a, c)?;
        let cva = parse_args(a, c, op, flags)?;
        match &cva {
            Condition::AssertMyCoinId(_) => {
                spend.flags &= !ELIGIBLE_FOR_FF;
            }
            Condition::AssertMyParentId(_) => {
                // a singleton's top layer only emits ASSERT_MY_AMOUNT followed
                // by ASSERT_MY_PARENT_ID. An ASSERT_MY_PARENT_ID anywhere else
                // must come from the inner puzzle, which rules out rebasing
                // the spend on a newer singleton version
                if condition_counter != 1 {
                    spend.flags &= !ELIGIBLE_FOR_FF;
                }
            }
            Condition::AggSigMe(..)
            | Condition::AggSigParent(..)
            | Condition::AggSigParentAmount(..)
            | Condition::AggSigParentPuzzle(..) => {
                spend.flags &= !ELIGIBLE_FOR_FF;
            }
            _ => {}
        }
        condition_counter += 1;

        match cva {
            Condition::ReserveFee(limit) => {
                // reserve fees are accumulated
                ret.reserve_fee = ret
                    .reserve_fee
                    .checked_add(limit)
                    .ok_or(ValidationErr(c, ErrorCode::ReserveFeeConditionFailed))?;
            }
            Condition::CreateCoin(ph, amount, hint) => {
                let new_coin = NewCoin {
                    puzzle_hash: a
                        .atom(ph)
                        .as_ref()
                        .try_into()
                        .map_err(|_| ValidationErr(ph, ErrorCode::InvalidPuzzleHash))?,
                    amount,
                    hint,
                };
                if !spend.create_coin.insert(new_coin) {
                    return Err(ValidationErr(c, ErrorCode::DuplicateOutput));
                }
                ret.addition_amount += u128::from(amount);
            }
            Condition::AssertSecondsRelative(s) => {
                // keep the most strict condition. i.e. the highest limit
                if let Some(existing) = spend.seconds_relative {
                    spend.seconds_relative = Some(max(existing, s));
                } else {
                    spend.seconds_relative = Some(s);
                }
                if let Some(bs) = spend.before_seconds_relative {
                    if bs <= s {
                        // this spend bundle requires to be spent *before* a
                        // timestamp and also *after* a timestamp that's the
                        // same or later. that's impossible.
                        return Err(ValidationErr(
                            c,
                            ErrorCode::ImpossibleSecondsRelativeConstraints,
                        ));
                    }
                }
                assert_not_ephemeral(&mut spend.flags, state, ret.spends.len());
            }
            Condition::AssertSecondsAbsolute(s) => {
                // keep the most strict condition. i.e. the highest limit
                ret.seconds_absolute = max(ret.seconds_absolute, s);
            }
            Condition::AssertHeightRelative(h) => {
                // keep the most strict condition. i.e. the highest limit
                if let Some(existing) = spend.height_relative {
                    spend.height_relative = Some(max(existing, h));
                } else {
                    spend.height_relative = Some(h);
                }
                if let Some(bh) = spend.before_height_relative {
                    if bh <= h {
                        return Err(ValidationErr(
                            c,
                            ErrorCode::ImpossibleHeightRelativeConstraints,
                        ));
                    }
                }
                assert_not_ephemeral(&mut spend.flags, state, ret.spends.len());
            }
            Condition::AssertHeightAbsolute(h) => {
                // keep the most strict condition. i.e. the highest limit
                ret.height_absolute = max(ret.height_absolute, h);
            }
            Condition::AssertBeforeSecondsRelative(s) => {
                // keep the most strict condition. i.e. the lowest limit
                if let Some(existing) = spend.before_seconds_relative {
                    spend.before_seconds_relative = Some(min(existing, s));
                } else {
                    spend.before_seconds_relative = Some(s);
                }
                if let Some(sr) = spend.seconds_relative {
                    if s <= sr {
                        return Err(ValidationErr(
                            c,
                            ErrorCode::ImpossibleSecondsRelativeConstraints,
                        ));
                    }
                }
                assert_not_ephemeral(&mut spend.flags, state, ret.spends.len());
            }
            Condition::AssertBeforeSecondsAbsolute(s) => {
                // keep the most strict condition. i.e. the lowest limit
                if let Some(existing) = ret.before_seconds_absolute {
                    ret.before_seconds_absolute = Some(min(existing, s));
                } else {
                    ret.before_seconds_absolute = Some(s);
                }
            }
            Condition::AssertBeforeHeightRelative(h) => {
                // keep the most strict condition. i.e. the lowest limit
                if let Some(existing) = spend.before_height_relative {
                    spend.before_height_relative = Some(min(existing, h));
                } else {
                    spend.before_height_relative = Some(h);
                }
                if let Some(hr) = spend.height_relative {
                    if h <= hr {
                        return Err(ValidationErr(
                            c,
                            ErrorCode::ImpossibleHeightRelativeConstraints,
                        ));
                    }
                }
                assert_not_ephemeral(&mut spend.flags, state, ret.spends.len());
            }
            Condition::AssertBeforeHeightAbsolute(h) => {
                // keep the most strict condition. i.e. the lowest limit
                if let Some(existing) = ret.before_height_absolute {
                    ret.before_height_absolute = Some(min(existing, h));
                } else {
                    ret.before_height_absolute = Some(h);
                }
            }
            Condition::AssertMyCoinId(id) => {
                if a.atom(id).as_ref() != (*spend.coin_id).as_ref() {
                    return Err(ValidationErr(c, ErrorCode::AssertMyCoinIdFailed));
                }
            }
            Condition::AssertMyAmount(amount) => {
                if amount != spend.coin_amount {
                    return Err(ValidationErr(c, ErrorCode::AssertMyAmountFailed));
                }
            }
            Condition::AssertMyBirthSeconds(s) => {
                // if this spend already has a birth_seconds assertion, it's an
                // error if it's different from the new birth assertion. One of
                // them must be false
                if spend.birth_seconds.map(|v| v == s) == Some(false) {
                    return Err(ValidationErr(c, ErrorCode::AssertMyBirthSecondsFailed));
                }
                spend.birth_seconds = Some(s);
                assert_not_ephemeral(&mut spend.flags, state, ret.spends.len());
            }
            Condition::AssertMyBirthHeight(h) => {
                if spend.birth_height.map(|v| v == h) == Some(false) {
                    return Err(ValidationErr(c, ErrorCode::AssertMyBirthHeightFailed));
                }
                spend.birth_height = Some(h);
                assert_not_ephemeral(&mut spend.flags, state, ret.spends.len());
            }
            Condition::AssertMyParentId(id) => {
                if a.atom(id).as_ref() != a.atom(spend.parent_id).as_ref() {
                    return Err(ValidationErr(c, ErrorCode::AssertMyParentIdFailed));
                }
            }
            Condition::AssertMyPuzzlehash(hash) => {
                if a.atom(hash).as_ref() != a.atom(spend.puzzle_hash).as_ref() {
                    return Err(ValidationErr(c, ErrorCode::AssertMyPuzzleHashFailed));
                }
            }
            Condition::AggSigMe(pk, msg) => {
                spend.agg_sig_me.push((to_key(a, pk)?, msg));
            }
            Condition::AggSigParent(pk, msg) => {
                spend.agg_sig_parent.push((to_key(a, pk)?, msg));
            }
            Condition::AggSigPuzzle(pk, msg) => {
                spend.agg_sig_puzzle.push((to_key(a, pk)?, msg));
            }
            Condition::AggSigAmount(pk, msg) => {
                spend.agg_sig_amount.push((to_key(a, pk)?, msg));
            }
            Condition::AggSigPuzzleAmount(pk, msg) => {
                spend.agg_sig_puzzle_amount.push((to_key(a, pk)?, msg));
            }
            Condition::AggSigParentAmount(pk, msg) => {
                spend.agg_sig_parent_amount.push((to_key(a, pk)?, msg));
            }
            Condition::AggSigParentPuzzle(pk, msg) => {
                spend.agg_sig_parent_puzzle.push((to_key(a, pk)?, msg));
            }
            Condition::AggSigUnsafe(pk, msg) => {
                // AGG_SIG_UNSAFE messages are not allowed to end with the
                // suffix added to other AGG_SIG_* conditions
                check_agg_sig_unsafe_message(a, msg, constants)?;
                ret.agg_sig_unsafe.push((to_key(a, pk)?, msg));
            }
            Condition::Softfork(cost) => {
                if *max_cost < cost {
                    return Err(ValidationErr(c, ErrorCode::CostExceeded));
                }
                *max_cost -= cost;
            }
            Condition::SkipRelativeCondition => {
                assert_not_ephemeral(&mut spend.flags, state, ret.spends.len());
            }
            Condition::Skip => {}
        }
    }

    // if this still looks like it might be a singleton, check the output
    // coins to look for something that looks like a singleton output, with
    // the same puzzle hash as our input coin
    if (spend.flags & ELIGIBLE_FOR_FF) != 0
        && !spend
            .create_coin
            .iter()
            .any(|c| (c.amount & 1) == 1 && a.atom(spend.puzzle_hash).as_ref() == c.puzzle_hash.as_slice())
    {
        spend.flags &= !ELIGIBLE_FOR_FF;
    }

    ret.spends.push(spend);
    Ok(())
}

fn is_ephemeral(
    a: &Allocator,
    spend_idx: usize,
    spent_ids: &HashMap<Arc<Bytes32>, usize>,
    spends: &[SpendConditions],
) -> bool {
    let spend = &spends[spend_idx];
    let Ok(parent_id) = Bytes32::try_from(a.atom(spend.parent_id).as_ref()) else {
        return false;
    };
    let idx = match spent_ids.get(&parent_id) {
        None => {
            return false;
        }
        Some(idx) => *idx,
    };

    // then lookup the coin (puzzle hash, amount) in its set of created
    // coins. Note that hint is not relevant for this lookup
    let Ok(puzzle_hash) = Bytes32::try_from(a.atom(spend.puzzle_hash).as_ref()) else {
        return false;
    };
    let parent_spend = &spends[idx];
    parent_spend.create_coin.contains(&NewCoin {
        puzzle_hash,
        amount: spend.coin_amount,
        hint: a.nil(),
    })
}

pub fn validate_conditions(
    a: &Allocator,
    ret: &SpendBundleConditions,
    state: &ParseState,
    spends: NodePtr,
) -> Result<(), ValidationErr> {
    if ret.removal_amount < ret.addition_amount {
        // The sum of removal amounts must not be less than the sum of
        // addition amounts
        return Err(ValidationErr(spends, ErrorCode::MintingCoin));
    }

    if ret.removal_amount - ret.addition_amount < u128::from(ret.reserve_fee) {
        // the actual fee is lower than the reserved fee
        return Err(ValidationErr(spends, ErrorCode::ReserveFeeConditionFailed));
    }

    if let Some(bh) = ret.before_height_absolute {
        if bh <= ret.height_absolute {
            // this spend bundle requires to be spent *before* a height and
            // also *after* a height that's the same or later. that's
            // impossible.
            return Err(ValidationErr(
                spends,
                ErrorCode::ImpossibleHeightAbsoluteConstraints,
            ));
        }
    }

    if let Some(bs) = ret.before_seconds_absolute {
        if bs <= ret.seconds_absolute {
            return Err(ValidationErr(
                spends,
                ErrorCode::ImpossibleSecondsAbsoluteConstraints,
            ));
        }
    }

    for spend_idx in &state.assert_not_ephemeral {
        // make sure this coin was NOT created in this bundle
        // because consensus rules do not allow relative conditions on
        // ephemeral spends
        if is_ephemeral(a, *spend_idx, &state.spent_coins, &ret.spends) {
            return Err(ValidationErr(
                ret.spends[*spend_idx].parent_id,
                ErrorCode::EphemeralRelativeCondition,
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus_constants::TEST_CONSTANTS;
    use crate::flags::MEMPOOL_MODE;
    use kelp_protocol::Coin;
    use rstest::rstest;

    const PARENT: [u8; 32] = [1; 32];
    const PUZZLE_HASH: [u8; 32] = [2; 32];

    fn list(a: &mut Allocator, items: &[NodePtr]) -> NodePtr {
        let mut ret = a.nil();
        for i in items.iter().rev() {
            ret = a.new_pair(*i, ret).expect("new_pair");
        }
        ret
    }

    fn cond(a: &mut Allocator, op: u64, args: &[NodePtr]) -> NodePtr {
        let op = a.new_number(op.into()).expect("new_number");
        let mut items = vec![op];
        items.extend_from_slice(args);
        list(a, &items)
    }

    fn num(a: &mut Allocator, v: u64) -> NodePtr {
        a.new_number(v.into()).expect("new_number")
    }

    fn buf(a: &mut Allocator, b: &[u8]) -> NodePtr {
        a.new_atom(b).expect("new_atom")
    }

    struct TestSpend {
        parent: [u8; 32],
        puzzle_hash: [u8; 32],
        amount: u64,
    }

    impl Default for TestSpend {
        fn default() -> Self {
            Self {
                parent: PARENT,
                puzzle_hash: PUZZLE_HASH,
                amount: 1000,
            }
        }
    }

    // run a single spend with the given conditions through
    // process_single_spend
    fn parse_spend_conds(
        a: &mut Allocator,
        spend: &TestSpend,
        conds: &[NodePtr],
        flags: u32,
        max_cost: &mut Cost,
    ) -> Result<(SpendBundleConditions, ParseState), ValidationErr> {
        let mut ret = SpendBundleConditions::default();
        let mut state = ParseState::default();
        parse_spend_into(a, spend, conds, flags, max_cost, &mut ret, &mut state)?;
        Ok((ret, state))
    }

    fn parse_spend_into(
        a: &mut Allocator,
        spend: &TestSpend,
        conds: &[NodePtr],
        flags: u32,
        max_cost: &mut Cost,
        ret: &mut SpendBundleConditions,
        state: &mut ParseState,
    ) -> Result<(), ValidationErr> {
        let parent = buf(a, &spend.parent);
        let ph = buf(a, &spend.puzzle_hash);
        let amount = num(a, spend.amount);
        let cond_list = list(a, conds);
        process_single_spend(
            a,
            ret,
            state,
            parent,
            ph,
            amount,
            cond_list,
            flags,
            max_cost,
            &TEST_CONSTANTS,
        )
    }

    #[test]
    fn create_coin_and_reserve_fee() {
        let mut a = Allocator::new();
        let ph2 = buf(&mut a, &[3; 32]);
        let amt = num(&mut a, 100);
        let c1 = cond(&mut a, u64::from(CREATE_COIN), &[ph2, amt]);
        let fee = num(&mut a, 900);
        let c2 = cond(&mut a, u64::from(RESERVE_FEE), &[fee]);

        let mut cost = 11_000_000_000;
        let (conds, _) = parse_spend_conds(
            &mut a,
            &TestSpend::default(),
            &[c1, c2],
            MEMPOOL_MODE,
            &mut cost,
        )
        .expect("parse");

        assert_eq!(conds.spends.len(), 1);
        assert_eq!(conds.spends[0].create_coin.len(), 1);
        assert_eq!(conds.reserve_fee, 900);
        assert_eq!(conds.removal_amount, 1000);
        assert_eq!(conds.addition_amount, 100);
        // the CREATE_COIN cost was subtracted
        assert_eq!(cost, 11_000_000_000 - CREATE_COIN_COST);
    }

    #[test]
    fn duplicate_create_coin() {
        let mut a = Allocator::new();
        let ph2 = buf(&mut a, &[3; 32]);
        let amt = num(&mut a, 100);
        let c1 = cond(&mut a, u64::from(CREATE_COIN), &[ph2, amt]);
        let c2 = cond(&mut a, u64::from(CREATE_COIN), &[ph2, amt]);

        let mut cost = 11_000_000_000;
        let err = parse_spend_conds(
            &mut a,
            &TestSpend::default(),
            &[c1, c2],
            MEMPOOL_MODE,
            &mut cost,
        )
        .unwrap_err();
        assert_eq!(err.1, ErrorCode::DuplicateOutput);
    }

    #[test]
    fn double_spend_across_spends() {
        let mut a = Allocator::new();
        let mut ret = SpendBundleConditions::default();
        let mut state = ParseState::default();
        let mut cost = 11_000_000_000;

        parse_spend_into(
            &mut a,
            &TestSpend::default(),
            &[],
            MEMPOOL_MODE,
            &mut cost,
            &mut ret,
            &mut state,
        )
        .expect("first spend");

        let err = parse_spend_into(
            &mut a,
            &TestSpend::default(),
            &[],
            MEMPOOL_MODE,
            &mut cost,
            &mut ret,
            &mut state,
        )
        .unwrap_err();
        assert_eq!(err.1, ErrorCode::DoubleSpend);
    }

    #[rstest]
    // the strictest (highest) assert wins
    #[case(ASSERT_HEIGHT_ABSOLUTE, 100, 200, 200)]
    #[case(ASSERT_HEIGHT_ABSOLUTE, 200, 100, 200)]
    #[case(ASSERT_SECONDS_ABSOLUTE, 1000, 2000, 2000)]
    fn absolute_asserts_keep_strictest(
        #[case] op: ConditionOpcode,
        #[case] v1: u64,
        #[case] v2: u64,
        #[case] expect: u64,
    ) {
        let mut a = Allocator::new();
        let n1 = num(&mut a, v1);
        let c1 = cond(&mut a, u64::from(op), &[n1]);
        let n2 = num(&mut a, v2);
        let c2 = cond(&mut a, u64::from(op), &[n2]);

        let mut cost = 11_000_000_000;
        let (conds, _) = parse_spend_conds(
            &mut a,
            &TestSpend::default(),
            &[c1, c2],
            MEMPOOL_MODE,
            &mut cost,
        )
        .expect("parse");

        if op == ASSERT_HEIGHT_ABSOLUTE {
            assert_eq!(u64::from(conds.height_absolute), expect);
        } else {
            assert_eq!(conds.seconds_absolute, expect);
        }
    }

    #[test]
    fn before_height_lower_than_height_is_impossible() {
        let mut a = Allocator::new();
        let n1 = num(&mut a, 100);
        let c1 = cond(&mut a, u64::from(ASSERT_HEIGHT_RELATIVE), &[n1]);
        let n2 = num(&mut a, 50);
        let c2 = cond(&mut a, u64::from(ASSERT_BEFORE_HEIGHT_RELATIVE), &[n2]);

        let mut cost = 11_000_000_000;
        let err = parse_spend_conds(
            &mut a,
            &TestSpend::default(),
            &[c1, c2],
            MEMPOOL_MODE,
            &mut cost,
        )
        .unwrap_err();
        assert_eq!(err.1, ErrorCode::ImpossibleHeightRelativeConstraints);
    }

    #[test]
    fn assert_my_amount_mismatch() {
        let mut a = Allocator::new();
        let n = num(&mut a, 999);
        let c = cond(&mut a, u64::from(ASSERT_MY_AMOUNT), &[n]);

        let mut cost = 11_000_000_000;
        let err =
            parse_spend_conds(&mut a, &TestSpend::default(), &[c], MEMPOOL_MODE, &mut cost)
                .unwrap_err();
        assert_eq!(err.1, ErrorCode::AssertMyAmountFailed);
    }

    #[test]
    fn assert_my_coin_id_matches() {
        let mut a = Allocator::new();
        let coin = Coin::new(PARENT.into(), PUZZLE_HASH.into(), 1000);
        let id = coin.coin_id();
        let id_node = buf(&mut a, id.as_slice());
        let c = cond(&mut a, u64::from(ASSERT_MY_COIN_ID), &[id_node]);

        let mut cost = 11_000_000_000;
        let (conds, _) =
            parse_spend_conds(&mut a, &TestSpend::default(), &[c], MEMPOOL_MODE, &mut cost)
                .expect("parse");
        assert_eq!(*conds.spends[0].coin_id, id);
    }

    #[test]
    fn unknown_condition_rejected_in_mempool_mode() {
        let mut a = Allocator::new();
        // opcode 60 is not part of this chain's condition set
        let n = num(&mut a, 123);
        let c = cond(&mut a, 60, &[n]);

        let mut cost = 11_000_000_000;
        let err =
            parse_spend_conds(&mut a, &TestSpend::default(), &[c], MEMPOOL_MODE, &mut cost)
                .unwrap_err();
        assert_eq!(err.1, ErrorCode::InvalidConditionOpcode);

        // outside mempool mode it is ignored
        let mut cost = 11_000_000_000;
        let (conds, _) = parse_spend_conds(&mut a, &TestSpend::default(), &[c], 0, &mut cost)
            .expect("parse");
        assert_eq!(conds.spends.len(), 1);
    }

    #[test]
    fn create_coin_cost_exceeded() {
        let mut a = Allocator::new();
        let ph2 = buf(&mut a, &[3; 32]);
        let amt = num(&mut a, 100);
        let c = cond(&mut a, u64::from(CREATE_COIN), &[ph2, amt]);

        let mut cost = CREATE_COIN_COST - 1;
        let err =
            parse_spend_conds(&mut a, &TestSpend::default(), &[c], MEMPOOL_MODE, &mut cost)
                .unwrap_err();
        assert_eq!(err.1, ErrorCode::CostExceeded);
    }

    #[test]
    fn minting_coin_detected() {
        let mut a = Allocator::new();
        let ph2 = buf(&mut a, &[3; 32]);
        // create more value than the spent coin carries
        let amt = num(&mut a, 2000);
        let c = cond(&mut a, u64::from(CREATE_COIN), &[ph2, amt]);

        let mut cost = 11_000_000_000;
        let (conds, state) =
            parse_spend_conds(&mut a, &TestSpend::default(), &[c], MEMPOOL_MODE, &mut cost)
                .expect("parse");
        let nil = a.nil();
        let err = validate_conditions(&a, &conds, &state, nil).unwrap_err();
        assert_eq!(err.1, ErrorCode::MintingCoin);
    }

    #[test]
    fn reserve_fee_exceeds_fee() {
        let mut a = Allocator::new();
        let ph2 = buf(&mut a, &[3; 32]);
        let amt = num(&mut a, 900);
        let c1 = cond(&mut a, u64::from(CREATE_COIN), &[ph2, amt]);
        // the spend leaves 100 in fees, but reserves 200
        let fee = num(&mut a, 200);
        let c2 = cond(&mut a, u64::from(RESERVE_FEE), &[fee]);

        let mut cost = 11_000_000_000;
        let (conds, state) = parse_spend_conds(
            &mut a,
            &TestSpend::default(),
            &[c1, c2],
            MEMPOOL_MODE,
            &mut cost,
        )
        .expect("parse");
        let nil = a.nil();
        let err = validate_conditions(&a, &conds, &state, nil).unwrap_err();
        assert_eq!(err.1, ErrorCode::ReserveFeeConditionFailed);
    }

    #[test]
    fn relative_condition_on_ephemeral_spend() {
        let mut a = Allocator::new();
        let mut ret = SpendBundleConditions::default();
        let mut state = ParseState::default();
        let mut cost = 11_000_000_000;

        // the first spend creates a coin with puzzle hash [7; 32]
        let eph_ph: [u8; 32] = [7; 32];
        let ph = buf(&mut a, &eph_ph);
        let amt = num(&mut a, 100);
        let c = cond(&mut a, u64::from(CREATE_COIN), &[ph, amt]);
        parse_spend_into(
            &mut a,
            &TestSpend::default(),
            &[c],
            MEMPOOL_MODE,
            &mut cost,
            &mut ret,
            &mut state,
        )
        .expect("first spend");

        // the second spend spends it, with a relative height condition
        let parent = Coin::new(PARENT.into(), PUZZLE_HASH.into(), 1000).coin_id();
        let n = num(&mut a, 10);
        let c = cond(&mut a, u64::from(ASSERT_HEIGHT_RELATIVE), &[n]);
        parse_spend_into(
            &mut a,
            &TestSpend {
                parent: parent.to_bytes(),
                puzzle_hash: eph_ph,
                amount: 100,
            },
            &[c],
            MEMPOOL_MODE,
            &mut cost,
            &mut ret,
            &mut state,
        )
        .expect("second spend");

        let nil = a.nil();
        let err = validate_conditions(&a, &ret, &state, nil).unwrap_err();
        assert_eq!(err.1, ErrorCode::EphemeralRelativeCondition);
    }

    #[test]
    fn fast_forward_eligibility() {
        // an odd-amount spend re-creating its own puzzle hash with an odd
        // amount is eligible
        let mut a = Allocator::new();
        let ph = buf(&mut a, &PUZZLE_HASH);
        let amt = num(&mut a, 1001);
        let c = cond(&mut a, u64::from(CREATE_COIN), &[ph, amt]);

        let mut cost = 11_000_000_000;
        let spend = TestSpend {
            amount: 1001,
            ..TestSpend::default()
        };
        let (conds, _) =
            parse_spend_conds(&mut a, &spend, &[c], MEMPOOL_MODE, &mut cost).expect("parse");
        assert!((conds.spends[0].flags & ELIGIBLE_FOR_FF) != 0);

        // an even amount is not
        let amt = num(&mut a, 1000);
        let c = cond(&mut a, u64::from(CREATE_COIN), &[ph, amt]);
        let mut cost = 11_000_000_000;
        let (conds, _) = parse_spend_conds(
            &mut a,
            &TestSpend::default(),
            &[c],
            MEMPOOL_MODE,
            &mut cost,
        )
        .expect("parse");
        assert!((conds.spends[0].flags & ELIGIBLE_FOR_FF) == 0);
    }

    #[test]
    fn agg_sig_unsafe_suffix_rejected() {
        let mut a = Allocator::new();
        let pk = buf(&mut a, &[0xab; 48]);
        let mut msg_bytes = vec![1, 2, 3];
        msg_bytes.extend(TEST_CONSTANTS.agg_sig_me_additional_data.as_slice());
        let msg = buf(&mut a, &msg_bytes);
        let c = cond(&mut a, u64::from(AGG_SIG_UNSAFE), &[pk, msg]);

        let mut cost = 11_000_000_000;
        let err =
            parse_spend_conds(&mut a, &TestSpend::default(), &[c], MEMPOOL_MODE, &mut cost)
                .unwrap_err();
        assert_eq!(err.1, ErrorCode::InvalidMessage);
    }

    #[test]
    fn strict_args_count() {
        let mut a = Allocator::new();
        let n = num(&mut a, 100);
        let extra = num(&mut a, 1);
        let c = cond(&mut a, u64::from(ASSERT_HEIGHT_ABSOLUTE), &[n, extra]);

        // mempool mode requires the exact argument count
        let mut cost = 11_000_000_000;
        let err =
            parse_spend_conds(&mut a, &TestSpend::default(), &[c], MEMPOOL_MODE, &mut cost)
                .unwrap_err();
        assert_eq!(err.1, ErrorCode::InvalidCondition);

        // non-mempool mode ignores the garbage
        let mut cost = 11_000_000_000;
        let (conds, _) = parse_spend_conds(&mut a, &TestSpend::default(), &[c], 0, &mut cost)
            .expect("parse");
        assert_eq!(conds.height_absolute, 100);
    }
}

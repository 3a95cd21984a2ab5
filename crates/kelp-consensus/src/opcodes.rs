use clvmr::allocator::{Allocator, NodePtr, SExp};
use clvmr::cost::Cost;

pub type ConditionOpcode = u16;

// no-op condition
pub const REMARK: ConditionOpcode = 1;

pub const AGG_SIG_PARENT: ConditionOpcode = 43;
pub const AGG_SIG_PUZZLE: ConditionOpcode = 44;
pub const AGG_SIG_AMOUNT: ConditionOpcode = 45;
pub const AGG_SIG_PUZZLE_AMOUNT: ConditionOpcode = 46;
pub const AGG_SIG_PARENT_AMOUNT: ConditionOpcode = 47;
pub const AGG_SIG_PARENT_PUZZLE: ConditionOpcode = 48;
pub const AGG_SIG_UNSAFE: ConditionOpcode = 49;
pub const AGG_SIG_ME: ConditionOpcode = 50;

// the conditions below reserve coin amounts and have to be accounted for in
// output totals
pub const CREATE_COIN: ConditionOpcode = 51;
pub const RESERVE_FEE: ConditionOpcode = 52;

// the conditions below let coins inquire about themselves
pub const ASSERT_MY_COIN_ID: ConditionOpcode = 70;
pub const ASSERT_MY_PARENT_ID: ConditionOpcode = 71;
pub const ASSERT_MY_PUZZLEHASH: ConditionOpcode = 72;
pub const ASSERT_MY_AMOUNT: ConditionOpcode = 73;
pub const ASSERT_MY_BIRTH_SECONDS: ConditionOpcode = 74;
pub const ASSERT_MY_BIRTH_HEIGHT: ConditionOpcode = 75;

// the conditions below ensure that we're "far enough" in the future
// wall-clock time
pub const ASSERT_SECONDS_RELATIVE: ConditionOpcode = 80;
pub const ASSERT_SECONDS_ABSOLUTE: ConditionOpcode = 81;

// block index
pub const ASSERT_HEIGHT_RELATIVE: ConditionOpcode = 82;
pub const ASSERT_HEIGHT_ABSOLUTE: ConditionOpcode = 83;

// spend is not valid if block timestamp exceeds the specified one
pub const ASSERT_BEFORE_SECONDS_RELATIVE: ConditionOpcode = 84;
pub const ASSERT_BEFORE_SECONDS_ABSOLUTE: ConditionOpcode = 85;

// spend is not valid if block height exceeds the specified height
pub const ASSERT_BEFORE_HEIGHT_RELATIVE: ConditionOpcode = 86;
pub const ASSERT_BEFORE_HEIGHT_ABSOLUTE: ConditionOpcode = 87;

// takes its cost as the first parameter, followed by future extensions
// the cost is specified in increments of 10000, to keep the values smaller
pub const SOFTFORK: ConditionOpcode = 90;

pub const CREATE_COIN_COST: Cost = 1_800_000;
pub const AGG_SIG_COST: Cost = 1_200_000;

// 2-byte condition opcodes have costs according to this table:

// the values `100 * (17 ** idx)/(16 ** idx)` rounded to three significant
// decimal figures

const fn calculate_cost_table() -> [u64; 256] {
    let (a, b) = (17, 16);
    let mut s = [0; 256];
    let (mut num, mut den) = (100_u64, 1_u64);
    let max = 1 << 59;
    let mut idx = 0;
    while idx < 256 {
        let v = num / den;
        let mut power_of_ten = 1000;
        while power_of_ten < v {
            power_of_ten *= 10;
        }
        power_of_ten /= 1000;
        s[idx] = (v / power_of_ten) * power_of_ten;
        num *= a;
        den *= b;
        while num > max {
            num >>= 5;
            den >>= 5;
        }
        idx += 1;
    }
    s
}

const COSTS: [Cost; 256] = calculate_cost_table();

pub fn compute_unknown_condition_cost(op: ConditionOpcode) -> Cost {
    if op < 256 {
        0
    } else {
        COSTS[(op & 0xff) as usize]
    }
}

pub fn parse_opcode(a: &Allocator, op: NodePtr) -> Option<ConditionOpcode> {
    let buf = match a.sexp(op) {
        SExp::Atom => a.atom(op),
        SExp::Pair(..) => return None,
    };
    let buf = buf.as_ref();
    if buf.len() == 2 {
        if buf[0] == 0 {
            // no redundant leading zeroes
            None
        } else {
            // These are 2-byte condition codes whose first byte is non-zero.
            // They are not known conditions, but they have a cost
            Some(ConditionOpcode::from_be_bytes(
                buf.try_into().expect("internal error"),
            ))
        }
    } else if buf.len() == 1 {
        let b0 = ConditionOpcode::from(buf[0]);
        match b0 {
            AGG_SIG_UNSAFE
            | AGG_SIG_ME
            | AGG_SIG_PARENT
            | AGG_SIG_PUZZLE
            | AGG_SIG_AMOUNT
            | AGG_SIG_PUZZLE_AMOUNT
            | AGG_SIG_PARENT_AMOUNT
            | AGG_SIG_PARENT_PUZZLE
            | CREATE_COIN
            | RESERVE_FEE
            | ASSERT_MY_COIN_ID
            | ASSERT_MY_PARENT_ID
            | ASSERT_MY_PUZZLEHASH
            | ASSERT_MY_AMOUNT
            | ASSERT_MY_BIRTH_SECONDS
            | ASSERT_MY_BIRTH_HEIGHT
            | ASSERT_SECONDS_RELATIVE
            | ASSERT_SECONDS_ABSOLUTE
            | ASSERT_HEIGHT_RELATIVE
            | ASSERT_HEIGHT_ABSOLUTE
            | ASSERT_BEFORE_SECONDS_RELATIVE
            | ASSERT_BEFORE_SECONDS_ABSOLUTE
            | ASSERT_BEFORE_HEIGHT_RELATIVE
            | ASSERT_BEFORE_HEIGHT_ABSOLUTE
            | REMARK
            | SOFTFORK => Some(b0),
            _ => None,
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[51], Some(CREATE_COIN))]
    #[case(&[49], Some(AGG_SIG_UNSAFE))]
    #[case(&[50], Some(AGG_SIG_ME))]
    #[case(&[1], Some(REMARK))]
    #[case(&[90], Some(SOFTFORK))]
    #[case(&[87], Some(ASSERT_BEFORE_HEIGHT_ABSOLUTE))]
    // not part of this chain's condition set
    #[case(&[60], None)]
    #[case(&[66], None)]
    #[case(&[], None)]
    #[case(&[0], None)]
    // leading zeros are not allowed, it makes it a different value
    #[case(&[0, 51], None)]
    #[case(&[51, 0, 0], None)]
    // 2-byte codes are unknown-with-cost
    #[case(&[1, 0], Some(0x100))]
    #[case(&[0x4c, 0xff], Some(0x4cff))]
    #[case(&[1, 2, 3], None)]
    fn opcode_parsing(#[case] buf: &[u8], #[case] expect: Option<ConditionOpcode>) {
        let mut a = Allocator::new();
        let op = a.new_atom(buf).expect("new_atom");
        assert_eq!(parse_opcode(&a, op), expect);
    }

    #[test]
    fn opcode_must_be_atom() {
        let mut a = Allocator::new();
        let nil = a.nil();
        let pair = a.new_pair(nil, nil).expect("new_pair");
        assert_eq!(parse_opcode(&a, pair), None);
    }

    #[test]
    fn unknown_condition_costs() {
        // single byte opcodes are free
        assert_eq!(compute_unknown_condition_cost(0xff), 0);
        // the first cost bucket
        assert_eq!(compute_unknown_condition_cost(0x100), 100);
        // costs grow monotonically with the low byte
        let mut prev = 0;
        for op in 0x100..0x200 {
            let cost = compute_unknown_condition_cost(op);
            assert!(cost >= prev);
            prev = cost;
        }
    }
}

use std::mem;

use smallvec::SmallVec;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ComputeBudget111111111111111111111111111111");

/// 运行时允许单笔交易使用的 compute unit 上限。
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

pub fn compute_unit_limit_instruction(limit: u32) -> Instruction {
    let mut data = Vec::with_capacity(1 + mem::size_of::<u32>());
    data.push(2);
    data.extend_from_slice(&limit.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: Vec::new(),
        data,
    }
}

pub fn compute_unit_price_instruction(price_micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(1 + mem::size_of::<u64>());
    data.push(3);
    data.extend_from_slice(&price_micro_lamports.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: Vec::new(),
        data,
    }
}

/// 生成 `[limit, price]` 指令组合；price 为 0 时省略 price 指令。
pub fn compute_budget_sequence(unit_limit: u32, unit_price: u64) -> SmallVec<[Instruction; 2]> {
    let mut seq = SmallVec::<[Instruction; 2]>::new();
    seq.push(compute_unit_limit_instruction(unit_limit));
    if unit_price > 0 {
        seq.push(compute_unit_price_instruction(unit_price));
    }
    seq
}

pub fn is_compute_budget(ix: &Instruction) -> bool {
    ix.program_id == COMPUTE_BUDGET_PROGRAM_ID
}

/// 前置 `[limit, price]`，并移除已有的 compute budget 指令。
pub fn with_compute_budget(
    instructions: Vec<Instruction>,
    unit_limit: u32,
    unit_price: u64,
) -> Vec<Instruction> {
    let budget = compute_budget_sequence(unit_limit, unit_price);
    let mut out = Vec::with_capacity(budget.len() + instructions.len());
    out.extend(budget);
    out.extend(instructions.into_iter().filter(|ix| !is_compute_budget(ix)));
    out
}

/// Scales simulated usage by `margin`, clamped to `[1, MAX_COMPUTE_UNIT_LIMIT]`.
pub fn scaled_unit_limit(units_consumed: u64, margin: f64) -> u32 {
    // 以 bps 计算 margin，保证 1.1 精确放大。
    let margin_bps = if margin.is_finite() && margin >= 1.0 {
        (margin * 10_000.0).round().min(u32::MAX as f64) as u128
    } else {
        10_000
    };
    let scaled = (u128::from(units_consumed) * margin_bps).div_ceil(10_000);
    if scaled >= u128::from(MAX_COMPUTE_UNIT_LIMIT) {
        return MAX_COMPUTE_UNIT_LIMIT;
    }
    (scaled as u32).max(1)
}

/// 取近期优先费的 `percentile` 分位，并限制在 `[min, max]`。
pub fn unit_price_from_recent_fees(mut fees: Vec<u64>, percentile: u8, min: u64, max: u64) -> u64 {
    if fees.is_empty() {
        return min;
    }
    fees.sort_unstable();
    let percentile = usize::from(percentile.min(100));
    let index = (fees.len() - 1) * percentile / 100;
    fees[index].clamp(min, max.max(min))
}

/// Lamports charged for priority: `price * limit / 1_000_000`, rounded up.
pub fn prioritization_fee_lamports(unit_limit: u32, unit_price: u64) -> u64 {
    let micro = u128::from(unit_limit) * u128::from(unit_price);
    micro.div_ceil(1_000_000).min(u128::from(u64::MAX)) as u64
}

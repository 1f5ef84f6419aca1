use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_system_interface::instruction as system_instruction;

use crate::cache::cached_associated_token_address;

pub const ASSOCIATED_TOKEN_PROGRAM: Pubkey = spl_associated_token_account::ID;
pub const SYSTEM_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("11111111111111111111111111111111");
pub const NATIVE_MINT: Pubkey = solana_sdk::pubkey!("So11111111111111111111111111111111111111112");

/// Classic token account size.
const TOKEN_ACCOUNT_LEN: usize = 165;
/// Token-2022 的 ATA 总是带有 ImmutableOwner 扩展。
const TOKEN_2022_ASSOCIATED_ACCOUNT_LEN: usize = 170;

const ATA_CREATE: u8 = 0;
const ATA_CREATE_IDEMPOTENT: u8 = 1;

pub fn is_token_program(program: &Pubkey) -> bool {
    *program == spl_token::ID || *program == spl_token_2022::ID
}

pub fn associated_account_len(token_program: &Pubkey) -> usize {
    if *token_program == spl_token_2022::ID {
        TOKEN_2022_ASSOCIATED_ACCOUNT_LEN
    } else {
        TOKEN_ACCOUNT_LEN
    }
}

pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    cached_associated_token_address(owner, mint, token_program)
}

/// 幂等创建 ATA，由 `payer` 支付租金。
pub fn create_associated_account_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    let associated = associated_token_address(owner, mint, token_program);
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(associated, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(*token_program, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT],
    }
}

/// `transfer_checked` for either token program.
pub fn transfer_checked(
    token_program: &Pubkey,
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Result<Instruction, String> {
    spl_token_2022::instruction::transfer_checked(
        token_program,
        source,
        mint,
        destination,
        authority,
        &[],
        amount,
        decimals,
    )
    .map_err(|err| format!("transfer_checked: {err}"))
}

/// 关闭 `account`，租金 lamports 转给 `destination`。
pub fn close_account(
    token_program: &Pubkey,
    account: &Pubkey,
    destination: &Pubkey,
    owner: &Pubkey,
) -> Result<Instruction, String> {
    spl_token_2022::instruction::close_account(token_program, account, destination, owner, &[])
        .map_err(|err| format!("close_account: {err}"))
}

pub fn native_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    system_instruction::transfer(from, to, lamports)
}

/// 把 ATA 创建指令的租金付款方从 `user` 改为 `fee_payer`，返回改写的指令数量。
pub fn reassign_account_rent_payer(
    instructions: &mut [Instruction],
    user: &Pubkey,
    fee_payer: &Pubkey,
) -> usize {
    let mut rewritten = 0;
    for ix in instructions.iter_mut() {
        if ix.program_id != ASSOCIATED_TOKEN_PROGRAM {
            continue;
        }
        let is_create = matches!(
            ix.data.first().copied(),
            None | Some(ATA_CREATE) | Some(ATA_CREATE_IDEMPOTENT)
        );
        if !is_create {
            continue;
        }
        if let Some(funding) = ix.accounts.first_mut() {
            if funding.pubkey == *user {
                *funding = AccountMeta::new(*fee_payer, true);
                rewritten += 1;
            }
        }
    }
    rewritten
}

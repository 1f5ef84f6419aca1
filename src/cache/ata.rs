use dashmap::DashMap;
use once_cell::sync::Lazy;
use solana_sdk::pubkey::Pubkey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AtaKey {
    owner: Pubkey,
    mint: Pubkey,
    token_program: Pubkey,
}

static ATA_CACHE: Lazy<DashMap<AtaKey, Pubkey>> = Lazy::new(DashMap::new);

/// 返回缓存的 ATA 地址，未命中时计算并写入缓存。
pub fn cached_associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Pubkey {
    let key = AtaKey {
        owner: *owner,
        mint: *mint,
        token_program: *token_program,
    };
    *ATA_CACHE.entry(key).or_insert_with(|| {
        Pubkey::find_program_address(
            &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
            &spl_associated_token_account::ID,
        )
        .0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_programs_derive_distinct_addresses() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let classic = cached_associated_token_address(&owner, &mint, &spl_token::ID);
        let extended = cached_associated_token_address(&owner, &mint, &spl_token_2022::ID);
        assert_ne!(classic, extended);
        assert_eq!(
            classic,
            cached_associated_token_address(&owner, &mint, &spl_token::ID)
        );
    }
}

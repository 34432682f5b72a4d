//! Brew Chef Core Primitives
//!
//! Shared ledger types and the scaled-integer math behind reward accrual.
//! Every multiply-before-divide is evaluated in 256 bits and only narrowed
//! back to `u128` after the final division.

#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_core::{RuntimeDebug, U256};
use sp_runtime::traits::UniqueSaturatedInto;

/// Fixed-point scale of `acc_reward_per_share`.
pub const ACC_PRECISION: u128 = 1_000_000_000_000;

/// 100% in basis points.
pub const BASIS_POINTS_DENOMINATOR: u128 = 10_000;

/// Highest deposit fee a pool may charge (5%).
pub const MAX_DEPOSIT_FEE_BP: u16 = 500;

/// Share of every minted reward routed to the dev account (10%).
pub const DEV_CUT_BP: u16 = 1_000;

/// Highest referral commission the owner may configure (10%).
pub const MAX_REFERRAL_COMMISSION_BP: u16 = 1_000;

/// Referral commission in effect unless configured otherwise (1%).
pub const DEFAULT_REFERRAL_COMMISSION_BP: u16 = 100;

pub type PoolId = u32;
pub type AllocPoint = u64;
pub type BasisPoints = u16;

/// A weighted reward bucket bound to one deposit asset.
#[derive(Clone, Encode, Decode, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct PoolInfo<AssetId, Balance, BlockNumber> {
    /// Asset participants stake in this pool.
    pub lp_asset: AssetId,
    /// Weight of the pool against `TotalAllocPoint`.
    pub alloc_point: AllocPoint,
    /// Last block the accumulator was brought forward to.
    pub last_reward_block: BlockNumber,
    /// Reward per staked unit since inception, scaled by [`ACC_PRECISION`].
    pub acc_reward_per_share: u128,
    /// Deposit fee routed to the fee account.
    pub deposit_fee_bp: BasisPoints,
    /// Sum of all positions' net stake.
    pub total_staked: Balance,
}

/// A participant's stake and settlement point within one pool.
#[derive(Clone, Default, Encode, Decode, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct Position<Balance> {
    pub amount: Balance,
    /// `amount * acc_reward_per_share / ACC_PRECISION` at the last settlement.
    pub reward_debt: Balance,
}

impl<Balance: Copy + UniqueSaturatedInto<u128>> Position<Balance> {
    /// Reward accrued since the last settlement against `acc_reward_per_share`.
    pub fn pending(&self, acc_reward_per_share: u128) -> Option<u128> {
        let accrued = accrued_reward(self.amount.unique_saturated_into(), acc_reward_per_share)?;
        Some(accrued.saturating_sub(self.reward_debt.unique_saturated_into()))
    }
}

/// Outcome of a single refresh: how much to mint and where it goes.
#[derive(Clone, Copy, Default, PartialEq, Eq, RuntimeDebug)]
pub struct Emission {
    pub minted: u128,
    pub dev_cut: u128,
    pub to_pool: u128,
    /// The cap has been hit, by this emission or earlier.
    pub cap_reached: bool,
}

impl Emission {
    /// Clamp `reward` to what is left below `cap` and split off the dev cut.
    pub fn plan(reward: u128, minted_so_far: u128, cap: u128) -> Option<Self> {
        if minted_so_far >= cap {
            return Some(Self { cap_reached: true, ..Default::default() });
        }

        let headroom = cap - minted_so_far;
        let (minted, cap_reached) =
            if reward >= headroom { (headroom, true) } else { (reward, false) };

        let dev_cut = basis_points_of(minted, DEV_CUT_BP)?;
        Some(Self { minted, dev_cut, to_pool: minted.checked_sub(dev_cut)?, cap_reached })
    }
}

/// `a * b / denominator` with a 256-bit intermediate.
///
/// `None` on division by zero or when the quotient does not fit `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let quotient = U256::from(a).checked_mul(U256::from(b))? / U256::from(denominator);
    u128::try_from(quotient).ok()
}

/// `amount * bp / 10_000`, truncating.
pub fn basis_points_of(amount: u128, bp: BasisPoints) -> Option<u128> {
    mul_div(amount, bp as u128, BASIS_POINTS_DENOMINATOR)
}

/// Reward earned by a pool over `elapsed` blocks:
/// `elapsed * emission_rate * alloc_point / total_alloc_point`.
pub fn pool_reward(
    elapsed: u128,
    emission_rate: u128,
    alloc_point: AllocPoint,
    total_alloc_point: AllocPoint,
) -> Option<u128> {
    if total_alloc_point == 0 {
        return Some(0);
    }
    let weighted = U256::from(elapsed)
        .checked_mul(U256::from(emission_rate))?
        .checked_mul(U256::from(alloc_point))?;
    u128::try_from(weighted / U256::from(total_alloc_point)).ok()
}

/// Accumulator growth when `to_pool` is shared among `total_staked` units.
pub fn acc_increment(to_pool: u128, total_staked: u128) -> Option<u128> {
    mul_div(to_pool, ACC_PRECISION, total_staked)
}

/// Reward attributable to `amount` staked units at `acc_reward_per_share`.
pub fn accrued_reward(amount: u128, acc_reward_per_share: u128) -> Option<u128> {
    mul_div(amount, acc_reward_per_share, ACC_PRECISION)
}

/// The referral store the Chef reports to.
///
/// Recording is first-write-wins: once a user has a referrer, later calls
/// must leave it untouched.
pub trait ReferralRegistry<AccountId> {
    /// Bind `user` to `referrer` unless `user` already has one.
    fn record_referral(user: &AccountId, referrer: &AccountId);

    fn referrer_of(user: &AccountId) -> Option<AccountId>;

    /// Note a commission of `amount` paid out to `referrer`.
    fn record_commission(referrer: &AccountId, amount: u128);
}

/// No registry: nothing is recorded and nobody has a referrer.
impl<AccountId> ReferralRegistry<AccountId> for () {
    fn record_referral(_user: &AccountId, _referrer: &AccountId) {}

    fn referrer_of(_user: &AccountId) -> Option<AccountId> {
        None
    }

    fn record_commission(_referrer: &AccountId, _amount: u128) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_widens_before_dividing() {
        // u128::MAX * 2 overflows u128 but the quotient fits.
        assert_eq!(mul_div(u128::MAX, 2, 4), Some(u128::MAX / 2));
        assert_eq!(mul_div(1, 1, 0), None);
        assert_eq!(mul_div(u128::MAX, u128::MAX, 1), None);
    }

    #[test]
    fn test_basis_points() {
        assert_eq!(basis_points_of(1_000, DEV_CUT_BP), Some(100));
        assert_eq!(basis_points_of(900, DEFAULT_REFERRAL_COMMISSION_BP), Some(9));
        assert_eq!(basis_points_of(400, MAX_DEPOSIT_FEE_BP), Some(20));
        assert_eq!(basis_points_of(99, 100), Some(0));
    }

    #[test]
    fn test_pool_reward_by_weight() {
        assert_eq!(pool_reward(10, 1_000, 10, 10), Some(10_000));
        assert_eq!(pool_reward(5, 1_000, 10, 30), Some(1_666));
        assert_eq!(pool_reward(5, 1_000, 20, 30), Some(3_333));
        assert_eq!(pool_reward(5, 1_000, 0, 30), Some(0));
        assert_eq!(pool_reward(5, 1_000, 0, 0), Some(0));
    }

    #[test]
    fn test_emission_splits_dev_cut() {
        let e = Emission::plan(1_000, 0, 450_000).unwrap();
        assert_eq!(e, Emission { minted: 1_000, dev_cut: 100, to_pool: 900, cap_reached: false });
    }

    #[test]
    fn test_emission_clamps_to_headroom() {
        let e = Emission::plan(11_040_000, 230_000, 450_000).unwrap();
        assert_eq!(e.minted, 220_000);
        assert_eq!(e.dev_cut, 22_000);
        assert_eq!(e.to_pool, 198_000);
        assert!(e.cap_reached);

        let exact = Emission::plan(1_000, 449_000, 450_000).unwrap();
        assert_eq!(exact.minted, 1_000);
        assert!(exact.cap_reached);
    }

    #[test]
    fn test_emission_after_cap_is_empty() {
        let e = Emission::plan(5_000, 450_000, 450_000).unwrap();
        assert_eq!(e.minted, 0);
        assert_eq!(e.to_pool, 0);
        assert!(e.cap_reached);
    }

    #[test]
    fn test_position_pending() {
        // 4 blocks alone, 4 blocks at 1/3, 2 blocks at 1/6 of 900 per block.
        let acc = acc_increment(3_600, 10).unwrap()
            + acc_increment(3_600, 30).unwrap()
            + acc_increment(1_800, 60).unwrap();
        assert_eq!(acc, 510 * ACC_PRECISION);

        let alice = Position::<u64> { amount: 10, reward_debt: 0 };
        assert_eq!(alice.pending(acc), Some(5_100));

        let bob = Position::<u64> { amount: 20, reward_debt: 7_200 };
        assert_eq!(bob.pending(acc), Some(3_000));
    }

    #[test]
    fn test_pending_never_underflows() {
        let p = Position::<u64> { amount: 1, reward_debt: 10 };
        assert_eq!(p.pending(ACC_PRECISION), Some(0));
    }

    #[test]
    fn test_acc_increment_truncates() {
        // 9000 shared by 70 units: 128571428571428.57... per unit.
        assert_eq!(acc_increment(9_000, 70), Some(128_571_428_571_428));
        assert_eq!(acc_increment(9_000, 0), None);
    }

    #[test]
    fn test_null_registry() {
        <() as ReferralRegistry<u64>>::record_referral(&1, &2);
        assert_eq!(<() as ReferralRegistry<u64>>::referrer_of(&1), None);
    }
}

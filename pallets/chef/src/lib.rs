//! # Brew Chef Pallet
//!
//! Pays a capped reward asset to accounts staking LP assets in weighted pools.
//!
//! ## How it works:
//! - Every block after `StartBlock` emits `EmissionRate` reward units, split
//!   across pools by `alloc_point / TotalAllocPoint`
//! - 10% of every mint goes to the dev account, the rest to the Chef vault
//! - Each pool keeps `acc_reward_per_share` (scaled by 1e12); a position's
//!   pending reward is `amount * acc / 1e12 - reward_debt`
//! - Pools are refreshed lazily, by whichever call touches them first
//!
//! ## Supply cap:
//! - Total issuance of the reward asset never exceeds `MaxSupply`
//! - The refresh that reaches the cap mints only the remaining headroom and
//!   zeroes `EmissionRate` for good
//! - Rewards already accrued keep being paid from the vault afterwards
//!
//! ## Minimum balances:
//! - Adding a pool tops the vault up to the LP asset's minimum balance, paid
//!   by the caller, and stake leaves the vault with `Preserve`
//! - Reward the vault cannot send yet, or the recipient cannot hold yet, is
//!   kept in `OwedRewards` and paid by a later transfer or `claim_owed`
//! - A deposit fee the fee account cannot hold is left in the stake
//!
//! ## Referral:
//! - The first valid referrer a depositor names is recorded once, forever
//! - The referrer then receives `ReferralCommissionRate` of every payout

#![cfg_attr(not(feature = "std"), no_std)]

pub use pallet::*;

#[cfg(test)]
mod mock;

pub(crate) const LOG_TARGET: &str = "runtime::chef";

#[frame_support::pallet]
pub mod pallet {
    use super::LOG_TARGET;
    use brew_primitives::{
        acc_increment, accrued_reward, basis_points_of, pool_reward, AllocPoint, BasisPoints,
        Emission, PoolId, PoolInfo, Position, ReferralRegistry, DEFAULT_REFERRAL_COMMISSION_BP,
        MAX_DEPOSIT_FEE_BP, MAX_REFERRAL_COMMISSION_BP,
    };
    use frame_support::{
        pallet_prelude::*,
        traits::{
            fungibles::{Inspect, Mutate},
            tokens::{
                Balance as AssetBalance, DepositConsequence, Preservation, Provenance,
            },
        },
        PalletId,
    };
    use frame_system::pallet_prelude::*;
    use sp_runtime::traits::{
        AccountIdConversion, CheckedAdd, MaybeSerializeDeserialize, SaturatedConversion,
        Saturating, Zero,
    };

    pub type AssetIdOf<T> =
        <<T as Config>::Assets as Inspect<<T as frame_system::Config>::AccountId>>::AssetId;
    pub type BalanceOf<T> = <T as Config>::Balance;
    pub type PoolInfoOf<T> = PoolInfo<AssetIdOf<T>, BalanceOf<T>, BlockNumberFor<T>>;
    pub type PositionOf<T> = Position<BalanceOf<T>>;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// Balance of the reward asset and of every LP asset.
        type Balance: AssetBalance + MaybeSerializeDeserialize;

        /// Holds the reward asset and the LP assets.
        type Assets: Inspect<Self::AccountId, Balance = Self::Balance> + Mutate<Self::AccountId>;

        /// Where referral relationships live.
        type Referrals: ReferralRegistry<Self::AccountId>;

        /// Derives the vault account holding stakes and undistributed reward.
        #[pallet::constant]
        type PalletId: Get<PalletId>;

        /// Asset minted as reward.
        #[pallet::constant]
        type RewardAsset: Get<<Self::Assets as Inspect<Self::AccountId>>::AssetId>;

        /// Hard cap on the reward asset's total issuance.
        #[pallet::constant]
        type MaxSupply: Get<Self::Balance>;

        /// Ceiling accepted by `update_emission_rate` (one whole reward unit per block).
        #[pallet::constant]
        type MaxEmissionRate: Get<Self::Balance>;

        /// Upper bound on the number of pools, so a mass update stays bounded.
        #[pallet::constant]
        type MaxPools: Get<u32>;
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    // ============================================
    // STORAGE
    // ============================================

    #[pallet::type_value]
    pub fn DefaultReferralCommission() -> BasisPoints {
        DEFAULT_REFERRAL_COMMISSION_BP
    }

    /// Account allowed to manage pools and emission
    #[pallet::storage]
    #[pallet::getter(fn owner)]
    pub type Owner<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

    /// Receives the dev cut of every mint
    #[pallet::storage]
    #[pallet::getter(fn dev_account)]
    pub type DevAccount<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

    /// Receives deposit fees
    #[pallet::storage]
    #[pallet::getter(fn fee_account)]
    pub type FeeAccount<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

    /// Reward units emitted per block across all pools
    #[pallet::storage]
    #[pallet::getter(fn emission_rate)]
    pub type EmissionRate<T: Config> = StorageValue<_, BalanceOf<T>, ValueQuery>;

    /// No pool accrues before this block
    #[pallet::storage]
    #[pallet::getter(fn start_block)]
    pub type StartBlock<T: Config> = StorageValue<_, BlockNumberFor<T>, ValueQuery>;

    /// Sum of all pools' `alloc_point`
    #[pallet::storage]
    #[pallet::getter(fn total_alloc_point)]
    pub type TotalAllocPoint<T: Config> = StorageValue<_, AllocPoint, ValueQuery>;

    /// Number of pools; pool ids are `0..PoolCount`
    #[pallet::storage]
    #[pallet::getter(fn pool_count)]
    pub type PoolCount<T: Config> = StorageValue<_, u32, ValueQuery>;

    #[pallet::storage]
    #[pallet::getter(fn pools)]
    pub type Pools<T: Config> = StorageMap<_, Twox64Concat, PoolId, PoolInfoOf<T>, OptionQuery>;

    /// LP asset -> pool, one pool per asset
    #[pallet::storage]
    #[pallet::getter(fn pool_of_asset)]
    pub type PoolOfAsset<T: Config> =
        StorageMap<_, Blake2_128Concat, AssetIdOf<T>, PoolId, OptionQuery>;

    #[pallet::storage]
    #[pallet::getter(fn positions)]
    pub type Positions<T: Config> = StorageDoubleMap<
        _,
        Twox64Concat,
        PoolId,
        Blake2_128Concat,
        T::AccountId,
        PositionOf<T>,
        ValueQuery,
    >;

    /// Share of each payout routed to the recorded referrer
    #[pallet::storage]
    #[pallet::getter(fn referral_commission_rate)]
    pub type ReferralCommissionRate<T: Config> =
        StorageValue<_, BasisPoints, ValueQuery, DefaultReferralCommission>;

    /// Whether `Config::Referrals` is consulted at all
    #[pallet::storage]
    #[pallet::getter(fn referral_active)]
    pub type ReferralActive<T: Config> = StorageValue<_, bool, ValueQuery>;

    /// Reward earned but not yet transferable, either because the recipient
    /// cannot hold that little of the reward asset or because sending it would
    /// leave dust in the vault
    #[pallet::storage]
    #[pallet::getter(fn owed_reward)]
    pub type OwedRewards<T: Config> =
        StorageMap<_, Blake2_128Concat, T::AccountId, BalanceOf<T>, ValueQuery>;

    // ============================================
    // GENESIS CONFIG
    // ============================================

    #[pallet::genesis_config]
    #[derive(frame_support::DefaultNoBound)]
    pub struct GenesisConfig<T: Config> {
        pub owner: Option<T::AccountId>,
        pub dev_account: Option<T::AccountId>,
        pub fee_account: Option<T::AccountId>,
        pub emission_rate: BalanceOf<T>,
        pub start_block: BlockNumberFor<T>,
        /// Falls back to `DEFAULT_REFERRAL_COMMISSION_BP` when unset
        pub referral_commission_bp: Option<BasisPoints>,
        pub referral_active: bool,
    }

    #[pallet::genesis_build]
    impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
        fn build(&self) {
            if let Some(owner) = &self.owner {
                Owner::<T>::put(owner);
            }
            if let Some(dev) = &self.dev_account {
                DevAccount::<T>::put(dev);
            }
            if let Some(fee) = &self.fee_account {
                FeeAccount::<T>::put(fee);
            }
            EmissionRate::<T>::put(self.emission_rate);
            StartBlock::<T>::put(self.start_block);
            if let Some(rate) = self.referral_commission_bp {
                if let Err(e) = Pallet::<T>::ensure_commission_rate(rate) {
                    panic!("genesis referral commission {} bp rejected: {}", rate, e.as_str());
                }
                ReferralCommissionRate::<T>::put(rate);
            }
            ReferralActive::<T>::put(self.referral_active);
        }
    }

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        PoolAdded {
            pool_id: PoolId,
            lp_asset: AssetIdOf<T>,
            alloc_point: AllocPoint,
            deposit_fee_bp: BasisPoints,
        },
        PoolUpdated { pool_id: PoolId, alloc_point: AllocPoint, deposit_fee_bp: BasisPoints },
        /// `amount` is what was credited to the position, after `fee`
        Deposited { who: T::AccountId, pool_id: PoolId, amount: BalanceOf<T>, fee: BalanceOf<T> },
        Withdrawn { who: T::AccountId, pool_id: PoolId, amount: BalanceOf<T> },
        /// Stake returned, pending reward forfeited
        EmergencyWithdrawn { who: T::AccountId, pool_id: PoolId, amount: BalanceOf<T> },
        RewardPaid { who: T::AccountId, pool_id: PoolId, amount: BalanceOf<T> },
        /// `amount` is now owed to `who` and paid with a later transfer
        RewardOwed { who: T::AccountId, amount: BalanceOf<T> },
        OwedRewardClaimed { who: T::AccountId, amount: BalanceOf<T> },
        ReferralCommissionPaid { user: T::AccountId, referrer: T::AccountId, amount: BalanceOf<T> },
        EmissionRateUpdated { previous: BalanceOf<T>, new: BalanceOf<T> },
        /// The supply cap was reached; emission is permanently zero
        EmissionHalted { total_minted: BalanceOf<T>, at_block: BlockNumberFor<T> },
        DevAccountChanged { previous: T::AccountId, new: T::AccountId },
        FeeAccountChanged { previous: T::AccountId, new: T::AccountId },
        ReferralCommissionRateUpdated { rate: BasisPoints },
        ReferralActiveSet { active: bool },
        OwnershipTransferred { previous: T::AccountId, new: T::AccountId },
    }

    #[pallet::error]
    pub enum Error<T> {
        /// Caller does not hold the role this call requires
        Unauthorized,
        /// No pool with this id
        PoolNotFound,
        /// LP asset already has a pool
        DuplicatePool,
        /// Deposit fee above 500 basis points
        InvalidFee,
        /// Emission rate above `MaxEmissionRate`
        RateTooHigh,
        /// Withdrawal larger than the position
        InsufficientStake,
        /// Mint would push issuance past `MaxSupply`
        CapExceeded,
        /// `MaxPools` pools already exist
        TooManyPools,
        /// The reward asset cannot back a pool
        RewardAssetNotStakeable,
        /// Referral commission above `MAX_REFERRAL_COMMISSION_BP`
        CommissionTooHigh,
        /// Supply cap reached; emission can only be zero
        EmissionHalted,
        /// Arithmetic overflow
        ArithmeticOverflow,
    }

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
        fn integrity_test() {
            assert!(T::MaxPools::get() > 0, "MaxPools must allow at least one pool");
            assert!(!T::MaxSupply::get().is_zero(), "MaxSupply must be positive");
        }
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Register a pool for `lp_asset`. Owner only.
        ///
        /// With `with_update`, every existing pool is refreshed first so none of
        /// them accrues past this point under the old total weight.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0).saturating_mul(T::MaxPools::get() as u64))]
        pub fn add_pool(
            origin: OriginFor<T>,
            alloc_point: AllocPoint,
            lp_asset: AssetIdOf<T>,
            deposit_fee_bp: BasisPoints,
            with_update: bool,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_owner(&who)?;
            ensure!(deposit_fee_bp <= MAX_DEPOSIT_FEE_BP, Error::<T>::InvalidFee);
            ensure!(lp_asset != T::RewardAsset::get(), Error::<T>::RewardAssetNotStakeable);
            ensure!(!PoolOfAsset::<T>::contains_key(&lp_asset), Error::<T>::DuplicatePool);

            let pool_id = PoolCount::<T>::get();
            ensure!(pool_id < T::MaxPools::get(), Error::<T>::TooManyPools);
            let total_alloc = TotalAllocPoint::<T>::get()
                .checked_add(alloc_point)
                .ok_or(Error::<T>::ArithmeticOverflow)?;

            if with_update {
                Self::refresh_all()?;
            }
            Self::seed_reserve(&who, &lp_asset)?;

            let now = frame_system::Pallet::<T>::block_number();
            Pools::<T>::insert(
                pool_id,
                PoolInfo {
                    lp_asset: lp_asset.clone(),
                    alloc_point,
                    last_reward_block: now.max(StartBlock::<T>::get()),
                    acc_reward_per_share: 0,
                    deposit_fee_bp,
                    total_staked: Zero::zero(),
                },
            );
            PoolOfAsset::<T>::insert(&lp_asset, pool_id);
            PoolCount::<T>::put(pool_id.saturating_add(1));
            TotalAllocPoint::<T>::put(total_alloc);

            Self::deposit_event(Event::PoolAdded { pool_id, lp_asset, alloc_point, deposit_fee_bp });
            Ok(())
        }

        /// Change a pool's weight and deposit fee. Owner only.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0).saturating_mul(T::MaxPools::get() as u64))]
        pub fn set_pool(
            origin: OriginFor<T>,
            pool_id: PoolId,
            alloc_point: AllocPoint,
            deposit_fee_bp: BasisPoints,
            with_update: bool,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_owner(&who)?;
            ensure!(Pools::<T>::contains_key(pool_id), Error::<T>::PoolNotFound);
            ensure!(deposit_fee_bp <= MAX_DEPOSIT_FEE_BP, Error::<T>::InvalidFee);

            if with_update {
                Self::refresh_all()?;
            }

            let mut pool = Pools::<T>::get(pool_id).ok_or(Error::<T>::PoolNotFound)?;
            let total_alloc = TotalAllocPoint::<T>::get()
                .saturating_sub(pool.alloc_point)
                .checked_add(alloc_point)
                .ok_or(Error::<T>::ArithmeticOverflow)?;

            pool.alloc_point = alloc_point;
            pool.deposit_fee_bp = deposit_fee_bp;
            Pools::<T>::insert(pool_id, pool);
            TotalAllocPoint::<T>::put(total_alloc);

            Self::deposit_event(Event::PoolUpdated { pool_id, alloc_point, deposit_fee_bp });
            Ok(())
        }

        /// Stake `amount` of the pool's LP asset, harvesting pending reward first.
        ///
        /// `referrer` is recorded only for a non-zero deposit, only if it is not
        /// the caller, and only if the caller has no referrer yet.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(100_000_000, 0))]
        pub fn deposit(
            origin: OriginFor<T>,
            pool_id: PoolId,
            amount: BalanceOf<T>,
            referrer: Option<T::AccountId>,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let mut pool = Self::refresh_pool(pool_id)?;
            let mut position = Positions::<T>::get(pool_id, &who);

            if !position.amount.is_zero() {
                let pending = position
                    .pending(pool.acc_reward_per_share)
                    .ok_or(Error::<T>::ArithmeticOverflow)?;
                Self::pay_out(pool_id, &who, pending)?;
            }

            let mut credited: BalanceOf<T> = Zero::zero();
            let mut fee: BalanceOf<T> = Zero::zero();
            if !amount.is_zero() {
                if let Some(referrer) = referrer.filter(|r| r != &who) {
                    if ReferralActive::<T>::get() {
                        T::Referrals::record_referral(&who, &referrer);
                    }
                }

                fee = basis_points_of(amount.saturated_into(), pool.deposit_fee_bp)
                    .ok_or(Error::<T>::ArithmeticOverflow)?
                    .saturated_into();
                let fee_to = Self::fee_recipient();
                // A fee the fee account cannot hold yet stays with the stake.
                if !fee.is_zero() &&
                    T::Assets::can_deposit(pool.lp_asset.clone(), &fee_to, fee, Provenance::Extant) !=
                        DepositConsequence::Success
                {
                    fee = Zero::zero();
                }
                credited = amount.saturating_sub(fee);

                if !fee.is_zero() {
                    T::Assets::transfer(
                        pool.lp_asset.clone(),
                        &who,
                        &fee_to,
                        fee,
                        Preservation::Expendable,
                    )?;
                }
                T::Assets::transfer(
                    pool.lp_asset.clone(),
                    &who,
                    &Self::account_id(),
                    credited,
                    Preservation::Expendable,
                )?;

                position.amount =
                    position.amount.checked_add(&credited).ok_or(Error::<T>::ArithmeticOverflow)?;
                pool.total_staked =
                    pool.total_staked.checked_add(&credited).ok_or(Error::<T>::ArithmeticOverflow)?;
            }

            position.reward_debt = Self::debt_for(position.amount, pool.acc_reward_per_share)?;
            if position.amount.is_zero() {
                Positions::<T>::remove(pool_id, &who);
            } else {
                Positions::<T>::insert(pool_id, &who, position);
            }
            Pools::<T>::insert(pool_id, pool);

            Self::deposit_event(Event::Deposited { who, pool_id, amount: credited, fee });
            Ok(())
        }

        /// Unstake `amount`, harvesting pending reward. Zero only harvests.
        #[pallet::call_index(3)]
        #[pallet::weight(Weight::from_parts(100_000_000, 0))]
        pub fn withdraw(
            origin: OriginFor<T>,
            pool_id: PoolId,
            amount: BalanceOf<T>,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            ensure!(Pools::<T>::contains_key(pool_id), Error::<T>::PoolNotFound);
            let mut position = Positions::<T>::get(pool_id, &who);
            ensure!(position.amount >= amount, Error::<T>::InsufficientStake);

            let mut pool = Self::refresh_pool(pool_id)?;
            let pending = position
                .pending(pool.acc_reward_per_share)
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            Self::pay_out(pool_id, &who, pending)?;

            if !amount.is_zero() {
                position.amount = position.amount.saturating_sub(amount);
                pool.total_staked = pool.total_staked.saturating_sub(amount);
                T::Assets::transfer(
                    pool.lp_asset.clone(),
                    &Self::account_id(),
                    &who,
                    amount,
                    Preservation::Preserve,
                )?;
            }

            position.reward_debt = Self::debt_for(position.amount, pool.acc_reward_per_share)?;
            if position.amount.is_zero() {
                Positions::<T>::remove(pool_id, &who);
            } else {
                Positions::<T>::insert(pool_id, &who, position);
            }
            Pools::<T>::insert(pool_id, pool);

            Self::deposit_event(Event::Withdrawn { who, pool_id, amount });
            Ok(())
        }

        /// Take the whole stake back without touching rewards.
        ///
        /// Pending reward is forfeited and the pool is not refreshed, so this
        /// works even when reward accounting cannot proceed.
        #[pallet::call_index(4)]
        #[pallet::weight(Weight::from_parts(60_000_000, 0))]
        pub fn emergency_withdraw(origin: OriginFor<T>, pool_id: PoolId) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let mut pool = Pools::<T>::get(pool_id).ok_or(Error::<T>::PoolNotFound)?;
            let amount = Positions::<T>::take(pool_id, &who).amount;

            if !amount.is_zero() {
                pool.total_staked = pool.total_staked.saturating_sub(amount);
                T::Assets::transfer(
                    pool.lp_asset.clone(),
                    &Self::account_id(),
                    &who,
                    amount,
                    Preservation::Preserve,
                )?;
                Pools::<T>::insert(pool_id, pool);
            }

            Self::deposit_event(Event::EmergencyWithdrawn { who, pool_id, amount });
            Ok(())
        }

        /// Bring one pool's accumulator up to the current block.
        #[pallet::call_index(5)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0))]
        pub fn update_pool(origin: OriginFor<T>, pool_id: PoolId) -> DispatchResult {
            ensure_signed(origin)?;
            Self::refresh_pool(pool_id)?;
            Ok(())
        }

        /// Bring every pool up to the current block.
        #[pallet::call_index(6)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0).saturating_mul(T::MaxPools::get() as u64))]
        pub fn mass_update_pools(origin: OriginFor<T>) -> DispatchResult {
            ensure_signed(origin)?;
            Self::refresh_all()
        }

        /// Set reward units per block. Owner only.
        ///
        /// All pools are settled at the old rate first.
        #[pallet::call_index(7)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0).saturating_mul(T::MaxPools::get() as u64))]
        pub fn update_emission_rate(origin: OriginFor<T>, new_rate: BalanceOf<T>) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_owner(&who)?;
            ensure!(new_rate <= T::MaxEmissionRate::get(), Error::<T>::RateTooHigh);

            Self::refresh_all()?;
            ensure!(
                new_rate.is_zero() || Self::total_minted() < T::MaxSupply::get(),
                Error::<T>::EmissionHalted
            );

            let previous = EmissionRate::<T>::get();
            EmissionRate::<T>::put(new_rate);

            log::info!(
                target: LOG_TARGET,
                "emission rate {:?} -> {:?}",
                previous,
                new_rate
            );
            Self::deposit_event(Event::EmissionRateUpdated { previous, new: new_rate });
            Ok(())
        }

        /// Hand the dev cut to `new_dev`. Current dev account only.
        #[pallet::call_index(8)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_dev_account(origin: OriginFor<T>, new_dev: T::AccountId) -> DispatchResult {
            let who = ensure_signed(origin)?;
            ensure!(DevAccount::<T>::get().as_ref() == Some(&who), Error::<T>::Unauthorized);

            DevAccount::<T>::put(&new_dev);
            Self::deposit_event(Event::DevAccountChanged { previous: who, new: new_dev });
            Ok(())
        }

        /// Hand deposit fees to `new_fee_account`. Current fee account only.
        #[pallet::call_index(9)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_fee_account(
            origin: OriginFor<T>,
            new_fee_account: T::AccountId,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            ensure!(FeeAccount::<T>::get().as_ref() == Some(&who), Error::<T>::Unauthorized);

            FeeAccount::<T>::put(&new_fee_account);
            Self::deposit_event(Event::FeeAccountChanged { previous: who, new: new_fee_account });
            Ok(())
        }

        /// Set the referral commission in basis points. Owner only.
        #[pallet::call_index(10)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_referral_commission_rate(
            origin: OriginFor<T>,
            rate: BasisPoints,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_owner(&who)?;
            Self::ensure_commission_rate(rate)?;

            ReferralCommissionRate::<T>::put(rate);
            Self::deposit_event(Event::ReferralCommissionRateUpdated { rate });
            Ok(())
        }

        /// Attach or detach the referral registry. Owner only.
        #[pallet::call_index(11)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_referral_active(origin: OriginFor<T>, active: bool) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_owner(&who)?;

            ReferralActive::<T>::put(active);
            Self::deposit_event(Event::ReferralActiveSet { active });
            Ok(())
        }

        #[pallet::call_index(12)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn transfer_ownership(origin: OriginFor<T>, new_owner: T::AccountId) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_owner(&who)?;

            Owner::<T>::put(&new_owner);
            Self::deposit_event(Event::OwnershipTransferred { previous: who, new: new_owner });
            Ok(())
        }

        /// Collect owed reward without touching any pool. Whatever still cannot
        /// be sent stays owed.
        #[pallet::call_index(13)]
        #[pallet::weight(Weight::from_parts(30_000_000, 0))]
        pub fn claim_owed(origin: OriginFor<T>) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let paid = Self::transfer_reward(&who, 0)?;
            if paid > 0 {
                Self::deposit_event(Event::OwedRewardClaimed {
                    who,
                    amount: paid.saturated_into(),
                });
            }
            Ok(())
        }
    }

    impl<T: Config> Pallet<T> {
        /// Vault holding staked LP assets and undistributed reward.
        pub fn account_id() -> T::AccountId {
            T::PalletId::get().into_account_truncating()
        }

        /// Reward asset issued so far.
        pub fn total_minted() -> BalanceOf<T> {
            T::Assets::total_issuance(T::RewardAsset::get())
        }

        /// Reward `who` would harvest from `pool_id` at the current block.
        pub fn pending_reward(pool_id: PoolId, who: &T::AccountId) -> Option<BalanceOf<T>> {
            let pool = Pools::<T>::get(pool_id)?;
            let position = Positions::<T>::get(pool_id, who);
            let now = frame_system::Pallet::<T>::block_number();
            let staked: u128 = pool.total_staked.saturated_into();

            let mut acc = pool.acc_reward_per_share;
            if now > pool.last_reward_block && staked != 0 && pool.alloc_point != 0 {
                let emission = Self::emission_for(&pool, now).ok()?;
                acc = acc.checked_add(acc_increment(emission.to_pool, staked)?)?;
            }

            position.pending(acc).map(|p| p.saturated_into())
        }

        fn ensure_owner(who: &T::AccountId) -> DispatchResult {
            ensure!(Owner::<T>::get().as_ref() == Some(who), Error::<T>::Unauthorized);
            Ok(())
        }

        pub(crate) fn ensure_commission_rate(rate: BasisPoints) -> Result<(), Error<T>> {
            ensure!(rate <= MAX_REFERRAL_COMMISSION_BP, Error::<T>::CommissionTooHigh);
            Ok(())
        }

        // An unset fee account leaves the fee in the vault.
        fn fee_recipient() -> T::AccountId {
            FeeAccount::<T>::get().unwrap_or_else(Self::account_id)
        }

        fn debt_for(amount: BalanceOf<T>, acc: u128) -> Result<BalanceOf<T>, DispatchError> {
            let debt = accrued_reward(amount.saturated_into(), acc)
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            Ok(debt.saturated_into())
        }

        /// Reward a pool earns between its last refresh and `now`, clamped to the cap.
        fn emission_for(pool: &PoolInfoOf<T>, now: BlockNumberFor<T>) -> Result<Emission, DispatchError> {
            let elapsed: u128 = now.saturating_sub(pool.last_reward_block).saturated_into();
            let reward = pool_reward(
                elapsed,
                EmissionRate::<T>::get().saturated_into(),
                pool.alloc_point,
                TotalAllocPoint::<T>::get(),
            )
            .ok_or(Error::<T>::ArithmeticOverflow)?;

            Emission::plan(
                reward,
                Self::total_minted().saturated_into(),
                T::MaxSupply::get().saturated_into(),
            )
            .ok_or_else(|| Error::<T>::ArithmeticOverflow.into())
        }

        pub(crate) fn refresh_all() -> DispatchResult {
            for pool_id in 0..PoolCount::<T>::get() {
                Self::refresh_pool(pool_id)?;
            }
            Ok(())
        }

        /// Mint what `pool_id` earned since its last refresh and advance its
        /// accumulator to the current block.
        pub(crate) fn refresh_pool(pool_id: PoolId) -> Result<PoolInfoOf<T>, DispatchError> {
            let mut pool = Pools::<T>::get(pool_id).ok_or(Error::<T>::PoolNotFound)?;
            let now = frame_system::Pallet::<T>::block_number();
            if now <= pool.last_reward_block {
                return Ok(pool);
            }

            let staked: u128 = pool.total_staked.saturated_into();
            if staked == 0 || pool.alloc_point == 0 {
                pool.last_reward_block = now;
                Pools::<T>::insert(pool_id, &pool);
                return Ok(pool);
            }

            let emission = Self::emission_for(&pool, now)?;
            let vault = Self::account_id();
            let mintable = emission.minted > 0 &&
                T::Assets::can_deposit(
                    T::RewardAsset::get(),
                    &vault,
                    emission.minted.saturated_into(),
                    Provenance::Minted,
                ) == DepositConsequence::Success;

            if emission.minted > 0 && !mintable && !emission.cap_reached {
                // Too little to open the vault's reward balance; let it grow.
                log::debug!(
                    target: LOG_TARGET,
                    "pool {} emission of {} deferred at {:?}",
                    pool_id,
                    emission.minted,
                    now
                );
                return Ok(pool);
            }

            if mintable {
                Self::mint_reward(&vault, emission.minted)?;
                // An unset dev account leaves the cut in the vault.
                if let Some(dev) = DevAccount::<T>::get() {
                    Self::transfer_reward(&dev, emission.dev_cut)?;
                }

                let increment =
                    acc_increment(emission.to_pool, staked).ok_or(Error::<T>::ArithmeticOverflow)?;
                pool.acc_reward_per_share = pool
                    .acc_reward_per_share
                    .checked_add(increment)
                    .ok_or(Error::<T>::ArithmeticOverflow)?;

                log::debug!(
                    target: LOG_TARGET,
                    "pool {} refreshed at {:?}: minted {}, acc {}",
                    pool_id,
                    now,
                    emission.minted,
                    pool.acc_reward_per_share
                );
            }
            pool.last_reward_block = now;
            Pools::<T>::insert(pool_id, &pool);

            if emission.cap_reached {
                Self::halt_emission(now);
            }
            Ok(pool)
        }

        fn halt_emission(now: BlockNumberFor<T>) {
            if EmissionRate::<T>::get().is_zero() {
                return;
            }
            EmissionRate::<T>::put(BalanceOf::<T>::zero());

            let total_minted = Self::total_minted();
            log::info!(
                target: LOG_TARGET,
                "supply cap reached at block {:?}, total minted {:?}; emission stopped",
                now,
                total_minted
            );
            Self::deposit_event(Event::EmissionHalted { total_minted, at_block: now });
        }

        fn mint_reward(to: &T::AccountId, amount: u128) -> DispatchResult {
            if amount == 0 {
                return Ok(());
            }
            let minted: u128 = Self::total_minted().saturated_into();
            let cap: u128 = T::MaxSupply::get().saturated_into();
            ensure!(minted.saturating_add(amount) <= cap, Error::<T>::CapExceeded);

            T::Assets::mint_into(T::RewardAsset::get(), to, amount.saturated_into())?;
            Ok(())
        }

        /// Pay `pending` to `who`, less the referrer's commission if one is recorded.
        fn pay_out(pool_id: PoolId, who: &T::AccountId, pending: u128) -> DispatchResult {
            if pending == 0 {
                return Ok(());
            }

            let mut to_user = pending;
            if ReferralActive::<T>::get() {
                if let Some(referrer) = T::Referrals::referrer_of(who) {
                    let commission =
                        basis_points_of(pending, ReferralCommissionRate::<T>::get())
                            .ok_or(Error::<T>::ArithmeticOverflow)?;
                    if commission > 0 {
                        Self::transfer_reward(&referrer, commission)?;
                        T::Referrals::record_commission(&referrer, commission);
                        to_user = pending.saturating_sub(commission);

                        Self::deposit_event(Event::ReferralCommissionPaid {
                            user: who.clone(),
                            referrer,
                            amount: commission.saturated_into(),
                        });
                    }
                }
            }

            let paid = Self::transfer_reward(who, to_user)?;
            log::debug!(target: LOG_TARGET, "pool {} paid {} to {:?}", pool_id, paid, who);
            Self::deposit_event(Event::RewardPaid {
                who: who.clone(),
                pool_id,
                amount: paid.saturated_into(),
            });
            Ok(())
        }

        /// Pay `amount` plus anything already owed to `to` out of the vault.
        ///
        /// The vault's reward balance is left either empty or at no less than the
        /// asset's minimum balance, and the recipient must be able to hold what it
        /// receives. Whatever cannot be sent now is kept in `OwedRewards`.
        fn transfer_reward(to: &T::AccountId, amount: u128) -> Result<u128, DispatchError> {
            let owed: u128 = OwedRewards::<T>::take(to).saturated_into();
            let due = amount.saturating_add(owed);
            if due == 0 {
                return Ok(0);
            }

            let asset = T::RewardAsset::get();
            let vault = Self::account_id();
            let held: u128 = T::Assets::balance(asset.clone(), &vault).saturated_into();
            let min: u128 = T::Assets::minimum_balance(asset.clone()).saturated_into();

            let mut sendable = due.min(held);
            let rest = held.saturating_sub(sendable);
            if rest > 0 && rest < min {
                sendable = held.saturating_sub(min);
            }

            let receivable = sendable > 0 &&
                T::Assets::can_deposit(
                    asset.clone(),
                    to,
                    sendable.saturated_into(),
                    Provenance::Extant,
                ) == DepositConsequence::Success;
            if !receivable {
                Self::owe(to, due);
                return Ok(0);
            }

            T::Assets::transfer(
                asset,
                &vault,
                to,
                sendable.saturated_into(),
                Preservation::Expendable,
            )?;
            if due > sendable {
                Self::owe(to, due.saturating_sub(sendable));
            }
            Ok(sendable)
        }

        fn owe(who: &T::AccountId, amount: u128) {
            let amount: BalanceOf<T> = amount.saturated_into();
            OwedRewards::<T>::insert(who, amount);
            log::debug!(target: LOG_TARGET, "{:?} owed {:?} reward", who, amount);
            Self::deposit_event(Event::RewardOwed { who: who.clone(), amount });
        }

        /// Top the vault's balance of `asset` up to the asset's minimum balance,
        /// paid by `payer`. Stake is then debited with `Preserve` and can never
        /// drag the vault below the minimum and lose dust.
        fn seed_reserve(payer: &T::AccountId, asset: &AssetIdOf<T>) -> DispatchResult {
            let vault = Self::account_id();
            let shortfall = T::Assets::minimum_balance(asset.clone())
                .saturating_sub(T::Assets::balance(asset.clone(), &vault));
            if !shortfall.is_zero() {
                T::Assets::transfer(asset.clone(), payer, &vault, shortfall, Preservation::Preserve)?;
                log::debug!(
                    target: LOG_TARGET,
                    "vault reserve of {:?} seeded with {:?}",
                    asset,
                    shortfall
                );
            }
            Ok(())
        }
    }
}

//! # Brew Referral Pallet
//!
//! Relationship store used by the Chef to route referral commission.
//!
//! ## Rules:
//! - A user has at most one referrer, and the first one recorded is permanent
//! - Nobody can refer themselves
//! - Extrinsic recording is limited to operators appointed by the owner
//! - In-runtime callers go through `ReferralRegistry` and follow the same rules

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub use pallet::*;

#[frame_support::pallet]
pub mod pallet {
    use alloc::vec::Vec;
    use brew_primitives::ReferralRegistry;
    use frame_support::pallet_prelude::*;
    use frame_system::pallet_prelude::*;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    /// Account allowed to appoint operators
    #[pallet::storage]
    #[pallet::getter(fn owner)]
    pub type Owner<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

    /// Accounts allowed to record referrals through `record_referral`
    #[pallet::storage]
    #[pallet::getter(fn is_operator)]
    pub type Operators<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, bool, ValueQuery>;

    /// user -> referrer, written once
    #[pallet::storage]
    #[pallet::getter(fn referrer)]
    pub type Referrers<T: Config> =
        StorageMap<_, Blake2_128Concat, T::AccountId, T::AccountId, OptionQuery>;

    /// Number of users each referrer brought in
    #[pallet::storage]
    #[pallet::getter(fn referrals_count)]
    pub type ReferralsCount<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, u32, ValueQuery>;

    /// Lifetime commission paid to each referrer
    #[pallet::storage]
    #[pallet::getter(fn total_commissions)]
    pub type TotalCommissions<T: Config> =
        StorageMap<_, Blake2_128Concat, T::AccountId, u128, ValueQuery>;

    #[pallet::genesis_config]
    #[derive(frame_support::DefaultNoBound)]
    pub struct GenesisConfig<T: Config> {
        pub owner: Option<T::AccountId>,
        pub operators: Vec<T::AccountId>,
    }

    #[pallet::genesis_build]
    impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
        fn build(&self) {
            if let Some(owner) = &self.owner {
                Owner::<T>::put(owner);
            }
            for operator in &self.operators {
                Operators::<T>::insert(operator, true);
            }
        }
    }

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// `user` is now permanently referred by `referrer`
        ReferralRecorded { user: T::AccountId, referrer: T::AccountId },
        /// Operator status changed
        OperatorUpdated { operator: T::AccountId, status: bool },
        /// Commission paid out to a referrer
        CommissionRecorded { referrer: T::AccountId, amount: u128 },
        /// Registry owner changed
        OwnershipTransferred { previous: T::AccountId, new: T::AccountId },
    }

    #[pallet::error]
    pub enum Error<T> {
        /// Caller is not the registry owner
        Unauthorized,
        /// Caller is not an operator
        NotOperator,
        /// A user cannot refer themselves
        SelfReferral,
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Grant or revoke operator rights. Owner only.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(10_000, 0))]
        pub fn update_operator(
            origin: OriginFor<T>,
            operator: T::AccountId,
            status: bool,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_owner(&who)?;

            Operators::<T>::insert(&operator, status);
            Self::deposit_event(Event::OperatorUpdated { operator, status });
            Ok(())
        }

        /// Record `referrer` for `user`. No-op when `user` already has one.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(20_000, 0))]
        pub fn record_referral(
            origin: OriginFor<T>,
            user: T::AccountId,
            referrer: T::AccountId,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            ensure!(Operators::<T>::get(&who), Error::<T>::NotOperator);
            ensure!(user != referrer, Error::<T>::SelfReferral);

            Self::try_record(&user, &referrer);
            Ok(())
        }

        /// Hand the registry to a new owner. Owner only.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(10_000, 0))]
        pub fn transfer_ownership(origin: OriginFor<T>, new_owner: T::AccountId) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_owner(&who)?;

            Owner::<T>::put(&new_owner);
            Self::deposit_event(Event::OwnershipTransferred { previous: who, new: new_owner });
            Ok(())
        }
    }

    impl<T: Config> Pallet<T> {
        fn ensure_owner(who: &T::AccountId) -> DispatchResult {
            ensure!(Owner::<T>::get().as_ref() == Some(who), Error::<T>::Unauthorized);
            Ok(())
        }

        /// Insert-if-absent. Returns whether a new relationship was written.
        fn try_record(user: &T::AccountId, referrer: &T::AccountId) -> bool {
            if user == referrer || Referrers::<T>::contains_key(user) {
                return false;
            }

            Referrers::<T>::insert(user, referrer);
            ReferralsCount::<T>::mutate(referrer, |c| *c = c.saturating_add(1));

            log::debug!(
                target: "runtime::referral",
                "referral recorded: {:?} -> {:?}",
                user,
                referrer
            );
            Self::deposit_event(Event::ReferralRecorded {
                user: user.clone(),
                referrer: referrer.clone(),
            });
            true
        }
    }

    impl<T: Config> ReferralRegistry<T::AccountId> for Pallet<T> {
        fn record_referral(user: &T::AccountId, referrer: &T::AccountId) {
            Self::try_record(user, referrer);
        }

        fn referrer_of(user: &T::AccountId) -> Option<T::AccountId> {
            Referrers::<T>::get(user)
        }

        fn record_commission(referrer: &T::AccountId, amount: u128) {
            if amount == 0 {
                return;
            }
            TotalCommissions::<T>::mutate(referrer, |total| *total = total.saturating_add(amount));
            Self::deposit_event(Event::CommissionRecorded { referrer: referrer.clone(), amount });
        }
    }
}

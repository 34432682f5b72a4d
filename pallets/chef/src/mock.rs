use crate as pallet_chef;
use frame_support::{derive_impl, parameter_types, traits::AsEnsureOriginWithArg, PalletId};
use frame_system::{EnsureRoot, EnsureSigned};
use sp_runtime::{traits::IdentityLookup, BuildStorage};

type Block = frame_system::mocking::MockBlock<Test>;

frame_support::construct_runtime!(
    pub enum Test {
        System: frame_system,
        Balances: pallet_balances,
        Assets: pallet_assets,
        Referral: pallet_referral,
        Chef: pallet_chef,
    }
);

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
    type Block = Block;
    type AccountId = u64;
    type Lookup = IdentityLookup<Self::AccountId>;
    type AccountData = pallet_balances::AccountData<u64>;
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Test {
    type AccountStore = System;
}

#[derive_impl(pallet_assets::config_preludes::TestDefaultConfig)]
impl pallet_assets::Config for Test {
    type Currency = Balances;
    type CreateOrigin = AsEnsureOriginWithArg<EnsureSigned<u64>>;
    type ForceOrigin = EnsureRoot<u64>;
    type Freezer = ();
}

impl pallet_referral::Config for Test {
    type RuntimeEvent = RuntimeEvent;
}

parameter_types! {
    pub const ChefPalletId: PalletId = PalletId(*b"brewchef");
    pub const RewardAssetId: u32 = REWARD;
    pub const MaxSupply: u64 = 450_000;
    pub const MaxEmissionRate: u64 = 1_000_000;
    pub const MaxPools: u32 = 8;
}

impl pallet_chef::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type Balance = u64;
    type Assets = Assets;
    type Referrals = Referral;
    type PalletId = ChefPalletId;
    type RewardAsset = RewardAssetId;
    type MaxSupply = MaxSupply;
    type MaxEmissionRate = MaxEmissionRate;
    type MaxPools = MaxPools;
}

pub const OWNER: u64 = 1;
pub const DEV: u64 = 2;
pub const FEE: u64 = 3;
pub const ALICE: u64 = 10;
pub const BOB: u64 = 11;
pub const CAROL: u64 = 12;
pub const ASSET_ADMIN: u64 = 99;

pub const REWARD: u32 = 0;
pub const LP1: u32 = 1;
pub const LP2: u32 = 2;
/// LP asset with a minimum balance above one unit
pub const LP3: u32 = 3;
pub const LP3_MIN_BALANCE: u64 = 10;

pub const LP_BALANCE: u64 = 50_000;

pub struct ExtBuilder {
    emission_rate: u64,
    start_block: u64,
    referral_active: bool,
    referral_commission_bp: Option<u16>,
    reward_min_balance: u64,
}

impl Default for ExtBuilder {
    fn default() -> Self {
        Self {
            emission_rate: 1_000,
            start_block: 100,
            referral_active: false,
            referral_commission_bp: None,
            reward_min_balance: 1,
        }
    }
}

impl ExtBuilder {
    pub fn emission_rate(mut self, rate: u64) -> Self {
        self.emission_rate = rate;
        self
    }

    pub fn start_block(mut self, block: u64) -> Self {
        self.start_block = block;
        self
    }

    pub fn with_referrals(mut self) -> Self {
        self.referral_active = true;
        self
    }

    pub fn referral_commission(mut self, bp: u16) -> Self {
        self.referral_commission_bp = Some(bp);
        self
    }

    pub fn reward_min_balance(mut self, min_balance: u64) -> Self {
        self.reward_min_balance = min_balance;
        self
    }

    pub fn build(self) -> sp_io::TestExternalities {
        let mut t = frame_system::GenesisConfig::<Test>::default().build_storage().unwrap();

        // The owner funds each pool's vault reserve.
        let holders = [OWNER, ALICE, BOB, CAROL];
        pallet_assets::GenesisConfig::<Test> {
            assets: vec![
                (REWARD, ASSET_ADMIN, true, self.reward_min_balance),
                (LP1, ASSET_ADMIN, true, 1),
                (LP2, ASSET_ADMIN, true, 1),
                (LP3, ASSET_ADMIN, true, LP3_MIN_BALANCE),
            ],
            accounts: holders
                .iter()
                .flat_map(|who| {
                    [(LP1, *who, LP_BALANCE), (LP2, *who, LP_BALANCE), (LP3, *who, LP_BALANCE)]
                })
                .collect(),
            ..Default::default()
        }
        .assimilate_storage(&mut t)
        .unwrap();

        pallet_referral::GenesisConfig::<Test> { owner: Some(OWNER), operators: vec![] }
            .assimilate_storage(&mut t)
            .unwrap();

        pallet_chef::GenesisConfig::<Test> {
            owner: Some(OWNER),
            dev_account: Some(DEV),
            fee_account: Some(FEE),
            emission_rate: self.emission_rate,
            start_block: self.start_block,
            referral_commission_bp: self.referral_commission_bp,
            referral_active: self.referral_active,
        }
        .assimilate_storage(&mut t)
        .unwrap();

        let mut ext: sp_io::TestExternalities = t.into();
        ext.execute_with(|| System::set_block_number(1));
        ext
    }
}

pub fn run_to_block(n: u64) {
    System::set_block_number(n);
}

pub fn reward_balance(who: u64) -> u64 {
    Assets::balance(REWARD, who)
}

pub fn lp_balance(asset: u32, who: u64) -> u64 {
    Assets::balance(asset, who)
}

pub fn total_minted() -> u64 {
    Chef::total_minted()
}

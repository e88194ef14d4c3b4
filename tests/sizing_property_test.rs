use std::num::NonZeroUsize;

use cbdrive::services::buckets::{effective_ram_mb, ram_per_bucket_mb};
use cbdrive::DriverConfig;
use proptest::prelude::*;

fn config() -> DriverConfig {
    DriverConfig::default()
}

proptest! {
    /// Property: effective RAM never exceeds total RAM
    ///
    /// The multiplier is below 1 and the indexer reserve is subtracted, so
    /// usable RAM must always be strictly less than the raw machine total.
    #[test]
    fn prop_effective_ram_below_total(total_mb in 0u64..1_000_000) {
        let effective = effective_ram_mb(&config(), total_mb);
        prop_assert!(effective < total_mb as i64);
    }

    /// Property: bucket shares never oversubscribe the effective RAM
    #[test]
    fn prop_shares_never_oversubscribe(
        total_mb in 1_000u64..1_000_000,
        buckets in 1usize..64,
    ) {
        let effective = effective_ram_mb(&config(), total_mb);
        let buckets = NonZeroUsize::new(buckets).unwrap();
        let share = ram_per_bucket_mb(effective, buckets);
        prop_assert!(share * buckets.get() as i64 <= effective);
    }

    /// Property: adding buckets never grows the per-bucket share
    #[test]
    fn prop_share_monotone_in_bucket_count(
        total_mb in 1_000u64..1_000_000,
        buckets in 1usize..63,
    ) {
        let effective = effective_ram_mb(&config(), total_mb);
        let fewer = NonZeroUsize::new(buckets).unwrap();
        let more = NonZeroUsize::new(buckets + 1).unwrap();
        prop_assert!(ram_per_bucket_mb(effective, more) <= ram_per_bucket_mb(effective, fewer));
    }

    /// Property: a single bucket gets exactly the effective RAM
    #[test]
    fn prop_single_bucket_gets_everything(total_mb in 1_000u64..1_000_000) {
        let effective = effective_ram_mb(&config(), total_mb);
        let one = NonZeroUsize::new(1).unwrap();
        prop_assert_eq!(ram_per_bucket_mb(effective, one), effective);
    }
}

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a feed name is not in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feed name: {0}")]
pub struct UnknownFeedName(pub String);

/// Known GBFS feed types.
///
/// Declaration order is the canonical order used when the discovery listing
/// is sorted, so `gbfs.json` output is deterministic regardless of which
/// handler finished its first cycle first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedName {
    Gbfs,
    GbfsVersions,
    Manifest,
    SystemInformation,
    VehicleTypes,
    StationInformation,
    StationStatus,
    FreeBikeStatus,
    VehicleStatus,
    SystemHours,
    SystemCalendar,
    SystemRegions,
    SystemPricingPlans,
    SystemAlerts,
    GeofencingZones,
}

impl FeedName {
    /// Registry of every known feed, in canonical order.
    pub const ALL: [FeedName; 15] = [
        FeedName::Gbfs,
        FeedName::GbfsVersions,
        FeedName::Manifest,
        FeedName::SystemInformation,
        FeedName::VehicleTypes,
        FeedName::StationInformation,
        FeedName::StationStatus,
        FeedName::FreeBikeStatus,
        FeedName::VehicleStatus,
        FeedName::SystemHours,
        FeedName::SystemCalendar,
        FeedName::SystemRegions,
        FeedName::SystemPricingPlans,
        FeedName::SystemAlerts,
        FeedName::GeofencingZones,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedName::Gbfs => "gbfs",
            FeedName::GbfsVersions => "gbfs_versions",
            FeedName::Manifest => "manifest",
            FeedName::SystemInformation => "system_information",
            FeedName::VehicleTypes => "vehicle_types",
            FeedName::StationInformation => "station_information",
            FeedName::StationStatus => "station_status",
            FeedName::FreeBikeStatus => "free_bike_status",
            FeedName::VehicleStatus => "vehicle_status",
            FeedName::SystemHours => "system_hours",
            FeedName::SystemCalendar => "system_calendar",
            FeedName::SystemRegions => "system_regions",
            FeedName::SystemPricingPlans => "system_pricing_plans",
            FeedName::SystemAlerts => "system_alerts",
            FeedName::GeofencingZones => "geofencing_zones",
        }
    }

    /// Position in [`FeedName::ALL`].
    pub fn canonical_index(self) -> usize {
        self as usize
    }

    /// True for the top-level discovery feed (`gbfs.json`).
    pub fn is_discovery(self) -> bool {
        self == FeedName::Gbfs
    }

    /// Default file name for this feed, e.g. `station_status.json`.
    pub fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for FeedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedName {
    type Err = UnknownFeedName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeedName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownFeedName(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_every_registered_name() {
        for name in FeedName::ALL {
            assert_eq!(name.as_str().parse::<FeedName>(), Ok(name));
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = "vehicle_positions".parse::<FeedName>().unwrap_err();
        assert_eq!(err, UnknownFeedName("vehicle_positions".into()));
        assert!(err.to_string().contains("vehicle_positions"));
    }

    #[test]
    fn test_v3_feed_names_registered() {
        assert_eq!("vehicle_status".parse(), Ok(FeedName::VehicleStatus));
        assert_eq!("manifest".parse(), Ok(FeedName::Manifest));
        assert!(FeedName::FreeBikeStatus < FeedName::VehicleStatus);
        assert!(FeedName::VehicleStatus < FeedName::SystemHours);
    }

    #[test]
    fn test_canonical_index_matches_registry_order() {
        for (i, name) in FeedName::ALL.iter().enumerate() {
            assert_eq!(name.canonical_index(), i);
        }
        assert!(FeedName::SystemInformation < FeedName::StationInformation);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(FeedName::Gbfs.file_name(), "gbfs.json");
        assert!(FeedName::Gbfs.is_discovery());
        assert!(!FeedName::StationStatus.is_discovery());
    }
}

//! Controller models and the capability profile derived from them.
//!
//! The identification reply of a controller carries a model code (4 or 6
//! characters) and a firmware version. [`ControllerModel::from_code`] maps the
//! code onto a named model; [`ControllerProfile`] turns model and version into
//! the receive-buffer size and protocol capabilities used by the client.
//!
//! # Example
//!
//! ```
//! use unitronics_pcom::{ControllerModel, ControllerProfile, ModelTier, Version};
//!
//! let model = ControllerModel::from_code("35T2  ");
//! assert_eq!(model, ControllerModel::V350);
//! assert_eq!(model.tier(), ModelTier::Enhanced);
//!
//! let profile = ControllerProfile::new(model, Version::new(3, 9, 1));
//! assert_eq!(profile.buffer_size(), 1000);
//! assert!(profile.supports_binary_read());
//! ```

use std::fmt;

/// Capability tier of a controller family.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// M90, M91 and Jazz.
    Basic,
    /// Classic Vision controllers.
    Standard,
    /// Enhanced Vision and Samba controllers.
    Enhanced,
}

/// Named controller models.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ControllerModel {
    M90,
    M91,
    Jazz,
    V120,
    V130,
    V230,
    V260,
    V280,
    V290,
    V350,
    V430,
    V530,
    V560,
    V570,
    V700,
    V1040,
    V1210,
    Samba35,
    Samba43,
    Samba70,
    ExRc1,
    ExfRc15,
    Unknown,
}

impl ControllerModel {
    /// Looks up a model code from an identification reply.
    ///
    /// Codes are matched exactly, including trailing padding, before falling
    /// back to family prefixes.
    pub fn from_code(code: &str) -> Self {
        if code.len() < 4 || code.contains("BOOT") {
            return ControllerModel::Unknown;
        }

        match code {
            "B1  " | "B1A " | "R1  " | "R1C " | "R2C " | "T   " | "T1  " | "T1C " | "TA2C"
            | "TA3C" | "7B1 " | "7B1A" | "7R1" | "7R1C" | "7T  " | "7T1 " | "7T1C" | "7TA2"
            | "7TA3" => return ControllerModel::M90,
            "1TC2" | "1UN2" | "1R1 " | "1R2 " | "1R2C" | "1T1 " | "1UA2" | "1T2C" | "8TC2"
            | "8UN2" | "8R1 " | "8R2 " | "8R2C" | "8T1 " | "8UA2" | "8T38" | "8T2C" | "8R6C"
            | "8R34" | "8A19" | "8A22" | "1T38" | "8RZ " => return ControllerModel::M91,
            "JR14" | "JR17" | "JR10" | "JR16" | "JT10" | "JT17" | "JEW1" | "JE10" | "JR31"
            | "JT40" | "JP15" | "JE13" | "JA24" | "JN20" | "NR10" | "NR16" | "NR31" | "NT10"
            | "NT18" | "NT20" | "NT40" => return ControllerModel::Jazz,
            "2320" => return ControllerModel::V230,
            "2620" => return ControllerModel::V260,
            "2820" => return ControllerModel::V280,
            "2920" => return ControllerModel::V290,
            "VUN2" | "VR1 " | "VR2C" | "VUA2" | "VT1 " | "VT40" | "VT2C" | "VT38" | "WUN2"
            | "WR1 " | "WR2C" | "WUA2" | "WT1 " | "WT40" | "WT2C" | "WT38" | "WR6C" | "WR34"
            | "WA19" | "WA22" => return ControllerModel::V120,
            "ERC1" => return ControllerModel::ExRc1,
            "5320" => return ControllerModel::V530,
            "49C3" | "57C3" | "49T3" | "57T3" | "49T2" | "57T2" | "49T4" | "57T4" => {
                return ControllerModel::V570
            }
            "56C3" | "56T4" | "56T3" | "56T2" => return ControllerModel::V560,
            "43RH2 " => return ControllerModel::V430,
            "70T2" => return ControllerModel::V700,
            "EC15  " => return ControllerModel::ExfRc15,
            "10T2" => return ControllerModel::V1040,
            "12T2" => return ControllerModel::V1210,
            _ => {}
        }

        const PREFIXES: [(&str, ControllerModel); 7] = [
            ("13", ControllerModel::V130),
            ("35", ControllerModel::V350),
            ("43", ControllerModel::V430),
            ("S3", ControllerModel::Samba35),
            ("S4", ControllerModel::Samba43),
            ("S7", ControllerModel::Samba70),
            ("SO", ControllerModel::Samba70),
        ];

        PREFIXES
            .iter()
            .find(|(prefix, _)| code.starts_with(prefix))
            .map(|(_, model)| *model)
            .unwrap_or(ControllerModel::Unknown)
    }

    /// Capability tier of this model.
    ///
    /// Unknown controllers are treated as `Basic`.
    pub fn tier(self) -> ModelTier {
        use ControllerModel::*;
        match self {
            M90 | M91 | Jazz | Unknown => ModelTier::Basic,
            V120 | V230 | V260 | V280 | V290 | V530 | ExRc1 => ModelTier::Standard,
            V130 | V350 | V430 | V560 | V570 | V700 | V1040 | V1210 | Samba35 | Samba43
            | Samba70 | ExfRc15 => ModelTier::Enhanced,
        }
    }
}

impl fmt::Display for ControllerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerModel::ExRc1 => write!(f, "EX-RC1"),
            ControllerModel::ExfRc15 => write!(f, "EXF-RC15"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Firmware version reported by the controller.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
    /// Build number.
    pub build: u16,
}

impl Version {
    /// Creates a new version.
    pub fn new(major: u16, minor: u16, build: u16) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Lowest firmware major version that accepts binary writes.
pub const BINARY_WRITE_MIN_MAJOR: u16 = 3;

/// Model, version and the capabilities derived from them.
///
/// Built once from the identification reply and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerProfile {
    model: ControllerModel,
    version: Version,
}

impl ControllerProfile {
    /// Creates a profile.
    pub fn new(model: ControllerModel, version: Version) -> Self {
        Self { model, version }
    }

    /// Controller model.
    pub fn model(&self) -> ControllerModel {
        self.model
    }

    /// Firmware version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Capability tier.
    pub fn tier(&self) -> ModelTier {
        self.model.tier()
    }

    /// Receive-buffer size in bytes, used to size batched requests.
    pub fn buffer_size(&self) -> usize {
        match self.tier() {
            ModelTier::Basic => 256,
            ModelTier::Standard => 512,
            ModelTier::Enhanced => 1000,
        }
    }

    /// Returns whether batched reads may use Protocol B.
    pub fn supports_binary_read(&self) -> bool {
        self.tier() == ModelTier::Enhanced
    }

    /// Returns whether writes may use Protocol B.
    pub fn supports_binary_write(&self) -> bool {
        self.supports_binary_read() && self.version.major >= BINARY_WRITE_MIN_MAJOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_codes() {
        assert_eq!(ControllerModel::from_code("B1  "), ControllerModel::M90);
        assert_eq!(ControllerModel::from_code("8R34"), ControllerModel::M91);
        assert_eq!(ControllerModel::from_code("JR14"), ControllerModel::Jazz);
        assert_eq!(ControllerModel::from_code("2620"), ControllerModel::V260);
        assert_eq!(ControllerModel::from_code("WT38"), ControllerModel::V120);
        assert_eq!(ControllerModel::from_code("ERC1"), ControllerModel::ExRc1);
        assert_eq!(ControllerModel::from_code("57T4"), ControllerModel::V570);
        assert_eq!(ControllerModel::from_code("56C3"), ControllerModel::V560);
        assert_eq!(ControllerModel::from_code("EC15  "), ControllerModel::ExfRc15);
        assert_eq!(ControllerModel::from_code("12T2"), ControllerModel::V1210);
    }

    #[test]
    fn test_prefix_fallbacks() {
        assert_eq!(ControllerModel::from_code("13ZZ  "), ControllerModel::V130);
        assert_eq!(ControllerModel::from_code("35ABCD"), ControllerModel::V350);
        assert_eq!(ControllerModel::from_code("43T2  "), ControllerModel::V430);
        assert_eq!(ControllerModel::from_code("S3T99 "), ControllerModel::Samba35);
        assert_eq!(ControllerModel::from_code("S4R20 "), ControllerModel::Samba43);
        assert_eq!(ControllerModel::from_code("S7T20 "), ControllerModel::Samba70);
        assert_eq!(ControllerModel::from_code("SOT20 "), ControllerModel::Samba70);
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(ControllerModel::from_code("B1"), ControllerModel::Unknown);
        assert_eq!(ControllerModel::from_code("BOOT"), ControllerModel::Unknown);
        assert_eq!(ControllerModel::from_code("35BOOT"), ControllerModel::Unknown);
        assert_eq!(ControllerModel::from_code("ZZZZ"), ControllerModel::Unknown);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(ControllerModel::Jazz.tier(), ModelTier::Basic);
        assert_eq!(ControllerModel::Unknown.tier(), ModelTier::Basic);
        assert_eq!(ControllerModel::V290.tier(), ModelTier::Standard);
        assert_eq!(ControllerModel::Samba70.tier(), ModelTier::Enhanced);
    }

    #[test]
    fn test_profile_capabilities() {
        let basic = ControllerProfile::new(ControllerModel::M91, Version::new(5, 0, 0));
        assert_eq!(basic.buffer_size(), 256);
        assert!(!basic.supports_binary_read());
        assert!(!basic.supports_binary_write());

        let standard = ControllerProfile::new(ControllerModel::V230, Version::new(5, 0, 0));
        assert_eq!(standard.buffer_size(), 512);
        assert!(!standard.supports_binary_read());

        let old = ControllerProfile::new(ControllerModel::V570, Version::new(2, 4, 1));
        assert!(old.supports_binary_read());
        assert!(!old.supports_binary_write());

        let current = ControllerProfile::new(ControllerModel::V1040, Version::new(3, 0, 0));
        assert_eq!(current.buffer_size(), 1000);
        assert!(current.supports_binary_write());
    }

    #[test]
    fn test_display() {
        assert_eq!(ControllerModel::V1210.to_string(), "V1210");
        assert_eq!(ControllerModel::ExfRc15.to_string(), "EXF-RC15");
        assert_eq!(Version::new(3, 12, 7).to_string(), "3.12.7");
    }
}

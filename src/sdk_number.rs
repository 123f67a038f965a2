//! Platform API levels.

use serde::{Serialize, Serializer};
use std::fmt;

/// Android platform API level, as declared by `minSdkVersion` and `targetSdkVersion`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SdkNumber(u32);

impl SdkNumber {
    /// Gets the numeric API level.
    pub fn level(self) -> u32 {
        self.0
    }

    /// Gets the platform release name, if the level is known.
    ///
    /// As per: https://developer.android.com/reference/android/os/Build.VERSION_CODES
    pub fn release_name(self) -> Option<&'static str> {
        let name = match self.0 {
            1 => "Base",
            2 => "Base 1.1",
            3 => "Cupcake",
            4 => "Donut",
            5 => "Eclair",
            6 => "Eclair 0.1",
            7 => "Eclair MR1",
            8 => "Froyo",
            9 => "Gingerbread",
            10 => "Gingerbread MR1",
            11 => "Honeycomb",
            12 => "Honeycomb MR1",
            13 => "Honeycomb MR2",
            14 => "Ice Cream Sandwich",
            15 => "Ice Cream Sandwich MR1",
            16 => "Jelly Bean",
            17 => "Jelly Bean MR1",
            18 => "Jelly Bean MR2",
            19 => "KitKat",
            20 => "KitKat Watch",
            21 => "Lollipop",
            22 => "Lollipop MR1",
            23 => "Marshmallow",
            24 => "Nougat",
            25 => "Nougat MR1",
            26 => "Oreo",
            27 => "Oreo MR1",
            28 => "Pie",
            29 => "Android 10",
            30 => "Android 11",
            31 => "Android 12",
            32 => "Android 12L",
            33 => "Android 13",
            34 => "Android 14",
            35 => "Android 15",
            36 => "Android 16",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u32> for SdkNumber {
    fn from(level: u32) -> Self {
        Self(level)
    }
}

impl fmt::Display for SdkNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.release_name() {
            Some(name) => write!(f, "{} (API {})", name, self.0),
            None => write!(f, "API {}", self.0),
        }
    }
}

impl Serialize for SdkNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

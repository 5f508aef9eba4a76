use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Image id that was never filled in for a region.
pub const UNRESOLVED_IMAGE_ID: &str = "unknown";

/// Regions a VPN stack can be synthesized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    /// US West (Oregon)
    UsWest2,
    /// Asia Pacific (Hyderabad)
    ApSouth2,
    /// Asia Pacific (Osaka)
    ApNortheast3,
    /// Asia Pacific (Sydney)
    ApSoutheast2,
}

impl Region {
    pub const ALL: [Region; 4] = [
        Region::UsWest2,
        Region::ApSouth2,
        Region::ApNortheast3,
        Region::ApSoutheast2,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Region::UsWest2      => "us-west-2",
            Region::ApSouth2     => "ap-south-2",
            Region::ApNortheast3 => "ap-northeast-3",
            Region::ApSoutheast2 => "ap-southeast-2",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .iter()
            .copied()
            .find(|region| region.code() == s)
            .ok_or_else(|| Error::UnsupportedRegion { region: s.to_string() })
    }
}

/// Machine images keyed by region.
///
/// Rendered as the template's `AmiMap` mapping; the instance looks its image
/// up by the region it is deployed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMap {
    images: BTreeMap<Region, String>,
}

impl ImageMap {
    /// A mapping holding exactly one region.
    pub fn single(region: Region, image_id: &str) -> Result<ImageMap, Error> {
        let image_id = image_id.trim();
        if image_id.is_empty() || image_id == UNRESOLVED_IMAGE_ID {
            return Err(Error::UnresolvedImage { region: region.to_string(), image_id: image_id.into() });
        }
        let mut images = BTreeMap::new();
        images.insert(region, image_id.to_string());
        Ok(ImageMap { images })
    }

    #[cfg(test)]
    pub fn get(&self, region: Region) -> Option<&str> {
        self.images.get(&region).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item=(Region, &str)> {
        self.images.iter().map(|(region, id)| (*region, id.as_str()))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.images.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_codes_round_trip() {
        for region in &Region::ALL {
            assert_eq!(region.code().parse::<Region>().unwrap(), *region);
        }
    }

    #[test]
    fn test_unsupported_region() {
        let err = "eu-west-1".parse::<Region>().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "Unsupported region \"eu-west-1\"");
    }

    #[test]
    fn test_image_map_single() {
        let map = ImageMap::single(Region::UsWest2, "ami-0836fd4a4a0b4f6ec").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(Region::UsWest2), Some("ami-0836fd4a4a0b4f6ec"));
        assert_eq!(map.get(Region::ApSouth2), None);
    }

    #[test]
    fn test_image_map_rejects_unresolved() {
        assert!(ImageMap::single(Region::ApSouth2, "unknown").unwrap_err().is_configuration());
        assert!(ImageMap::single(Region::ApSouth2, "").unwrap_err().is_configuration());
        assert!(ImageMap::single(Region::ApSouth2, "   ").unwrap_err().is_configuration());
    }
}

//! Op attributes and the rank/method pairing.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use common::file_format::{self, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Spatial rank of the sampled data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rank {
    /// Images: `(batch, height, width, channels)`.
    Two,
    /// Volumes: `(batch, height, width, depth, channels)`.
    Three,
}

impl Rank {
    #[inline]
    pub fn spatial_dims(self) -> usize {
        match self {
            Rank::Two => 2,
            Rank::Three => 3,
        }
    }

    /// Rank of source, crop and gradient tensors.
    #[inline]
    pub fn tensor_dims(self) -> usize {
        self.spatial_dims() + 2
    }

    /// Columns of the box list: two bounds per spatial axis.
    #[inline]
    pub fn box_columns(self) -> usize {
        self.spatial_dims() * 2
    }

    /// The only interpolation method valid at this rank.
    pub fn method(self) -> Method {
        match self {
            Rank::Two => Method::Bilinear,
            Rank::Three => Method::Trilinear,
        }
    }

    pub(crate) fn count_word(self) -> &'static str {
        match self {
            Rank::Two => "two",
            Rank::Three => "three",
        }
    }
}

/// Interpolation method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Bilinear,
    Trilinear,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Bilinear => "bilinear",
            Method::Trilinear => "trilinear",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bilinear" => Ok(Method::Bilinear),
            "trilinear" => Ok(Method::Trilinear),
            _ => Err(Error::invalid(format!("unknown interpolation method '{}'", s))),
        }
    }
}

/// Attributes an op is constructed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpAttrs {
    /// Must be `"bilinear"` for rank 2 and `"trilinear"` for rank 3.
    pub method: String,
    /// Fill value for crop cells sampled outside the source. Forward only.
    pub extrapolation_value: f32,
}

impl Default for OpAttrs {
    fn default() -> Self {
        Self::for_rank(Rank::Two)
    }
}

impl OpAttrs {
    pub fn for_rank(rank: Rank) -> Self {
        Self {
            method: rank.method().as_str().to_string(),
            extrapolation_value: 0.0,
        }
    }

    pub fn with_extrapolation_value(mut self, value: f32) -> Self {
        self.extrapolation_value = value;
        self
    }

    /// Parses attributes from YAML or JSON text.
    pub fn parse(text: &str, format: FileFormat) -> Result<Self> {
        file_format::deserialize(text, format)
            .map_err(|e| Error::invalid(format!("failed to parse op attributes: {}", e)))
    }

    /// Loads attributes from a `.yaml`/`.yml`/`.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy();
        let format = FileFormat::from_file_name(&name).map_err(|e| Error::invalid(e.to_string()))?;
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid(format!("failed to read '{}': {}", name, e)))?;
        Self::parse(&text, format)
    }

    /// Checks that `method` names the rank's interpolation method.
    pub fn validate(&self, rank: Rank) -> Result<Method> {
        let expected = rank.method();
        if self.method != expected.as_str() {
            return Err(Error::invalid(format!(
                "method must be '{}', got '{}'",
                expected, self.method
            )));
        }
        Ok(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_shapes() {
        assert_eq!(Rank::Two.tensor_dims(), 4);
        assert_eq!(Rank::Three.tensor_dims(), 5);
        assert_eq!(Rank::Two.box_columns(), 4);
        assert_eq!(Rank::Three.box_columns(), 6);
    }

    #[test]
    fn test_method_round_trip() {
        for method in [Method::Bilinear, Method::Trilinear] {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), method);
        }
        assert!("bicubic".parse::<Method>().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_validate_pairs_method_with_rank() {
        assert_eq!(
            OpAttrs::for_rank(Rank::Three).validate(Rank::Three),
            Ok(Method::Trilinear)
        );
        let err = OpAttrs::for_rank(Rank::Two)
            .validate(Rank::Three)
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidArgument("method must be 'trilinear', got 'bilinear'".to_string())
        );
    }

    #[test]
    fn test_parse_yaml_with_defaults() {
        let attrs = OpAttrs::parse("extrapolation_value: -1.5\n", FileFormat::Yaml).unwrap();
        assert_eq!(attrs.method, "bilinear");
        assert_eq!(attrs.extrapolation_value, -1.5);
    }

    #[test]
    fn test_parse_json() {
        let attrs = OpAttrs::parse(r#"{"method": "trilinear"}"#, FileFormat::Json).unwrap();
        assert_eq!(attrs, OpAttrs::for_rank(Rank::Three));
    }

    #[test]
    fn test_parse_error_is_invalid_argument() {
        let err = OpAttrs::parse("{not json", FileFormat::Json).unwrap_err();
        assert!(err.is_invalid_argument());
    }
}

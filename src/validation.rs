//! Structural validation for gift definitions
//!
//! Both stores call [`validate_gift`] before inserting a catalog entry, so the
//! rules hold regardless of backend.

use rust_decimal::Decimal;

use crate::models::GiftDefinition;

/// Validation errors for catalog entries
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{field} must not be negative")]
    Negative { field: &'static str },

    #[error("sold ({sold}) exceeds total available ({total})")]
    SoldExceedsTotal { sold: u32, total: u32 },
}

/// URL slug: `^[a-z0-9]+(-[a-z0-9]+)*$`
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.is_empty() || slug.len() > 64 {
        return Err(ValidationError::InvalidLength {
            field: "slug",
            min: 1,
            max: 64,
            actual: slug.len(),
        });
    }

    let segments_ok = slug.split('-').all(|seg| {
        !seg.is_empty()
            && seg
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    });

    if !segments_ok {
        return Err(ValidationError::InvalidFormat {
            field: "slug",
            value: slug.to_string(),
            expected: "lowercase letters and digits separated by single hyphens",
        });
    }

    Ok(())
}

/// Hex color: `#RGB` or `#RRGGBB`
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let digits = color.strip_prefix('#');
    let valid = matches!(digits, Some(d) if (d.len() == 3 || d.len() == 6)
        && d.chars().all(|c| c.is_ascii_hexdigit()));

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "color",
            value: color.to_string(),
            expected: "#RGB or #RRGGBB",
        });
    }
    Ok(())
}

fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::InvalidLength {
            field,
            min: 1,
            max: 256,
            actual: 0,
        });
    }
    Ok(())
}

/// Validate every structural rule of a catalog entry
pub fn validate_gift(gift: &GiftDefinition) -> Result<(), ValidationError> {
    validate_required("name", &gift.name)?;
    validate_slug(&gift.slug)?;
    validate_color(&gift.color)?;
    validate_required("patternID", &gift.pattern_id)?;
    validate_required("lottieID", &gift.lottie_id)?;

    if gift.price < Decimal::ZERO {
        return Err(ValidationError::Negative { field: "price" });
    }

    if gift.sold > gift.total_available {
        return Err(ValidationError::SoldExceedsTotal {
            sold: gift.sold,
            total: gift.total_available,
        });
    }

    Ok(())
}

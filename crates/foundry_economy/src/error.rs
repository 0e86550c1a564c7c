//! # Economy Error Types
//!
//! Errors returned by the catalog loader and the production pipeline.
//!
//! Ledger, reservation and pool operations never return these: they report
//! rejection through sentinel values (`0.0`, `false`) instead.

use thiserror::Error;

use crate::resource::ResourceKey;

/// Errors that can occur in the economy system.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EconomyError {
    /// No recipe is registered for the requested product.
    #[error("recipe not found: {0}")]
    UnknownRecipe(ResourceKey),

    /// No refining rule produces the requested material.
    #[error("no refining rule produces {0}")]
    UnknownRefiningRule(ResourceKey),

    /// The material has no rule in the catalog.
    #[error("material not in catalog: {0}")]
    UnknownMaterial(ResourceKey),

    /// The capacity profile does not exist.
    #[error("capacity profile not found: {0}")]
    UnknownProfile(String),

    /// Not enough unreserved stock to cover a request.
    #[error("insufficient stock: need {required} of {resource}, have {available}")]
    InsufficientStock {
        /// The resource that was short.
        resource: ResourceKey,
        /// The amount required.
        required: f64,
        /// The unreserved amount available.
        available: f64,
    },

    /// The destination cannot hold the output.
    #[error("insufficient space: need {required} of {resource}, free {free}")]
    InsufficientSpace {
        /// The resource that did not fit.
        resource: ResourceKey,
        /// The amount that had to be stored.
        required: f64,
        /// Free capacity at the destination.
        free: f64,
    },

    /// A recipe line could not be satisfied by the candidate containers.
    #[error(
        "unmet requirement {material}: need {required} at quality >= {min_quality}, found {found}"
    )]
    RequirementUnmet {
        /// The material the recipe asked for.
        material: ResourceKey,
        /// Units required.
        required: u8,
        /// Minimum stack quality accepted.
        min_quality: u8,
        /// Eligible units found across all candidates.
        found: f64,
    },

    /// A zero or otherwise unusable quantity was passed in.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration '{path}': {message}")]
    ConfigIo {
        /// Path that failed to load.
        path: String,
        /// Underlying IO error message.
        message: String,
    },

    /// Configuration file is not valid TOML for the catalog schema.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;

//! JSON persistence shared by the fitted models.
//!
//! Every model is saved as a record carrying [GP_SCHEMA_VERSION]; loading a
//! record of another version is an error. Factorizations and Laplace modes
//! are not persisted but recomputed from the stored hyperparameters.
use crate::errors::{GpError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::BufReader;
use std::path::Path;

/// Version of the persisted model schema
pub const GP_SCHEMA_VERSION: u32 = 1;

pub(crate) fn write_record<R: Serialize>(path: impl AsRef<Path>, record: &R) -> Result<()> {
    let json = serde_json::to_vec(record)?;
    fs::write(path, json)?;
    Ok(())
}

pub(crate) fn read_record<R: DeserializeOwned>(path: impl AsRef<Path>) -> Result<R> {
    let file = fs::File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| GpError::LoadError(err.to_string()))
}

pub(crate) fn check_version(version: u32) -> Result<()> {
    if version != GP_SCHEMA_VERSION {
        return Err(GpError::LoadError(format!(
            "unsupported model version {version}, expected {GP_SCHEMA_VERSION}"
        )));
    }
    Ok(())
}

/// Any error met while rebuilding a model from a record is a load error
pub(crate) fn load_error(err: GpError) -> GpError {
    match err {
        GpError::LoadError(_) | GpError::LoadIoError(_) => err,
        err => GpError::LoadError(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_check() {
        assert!(check_version(GP_SCHEMA_VERSION).is_ok());
        assert!(matches!(check_version(0), Err(GpError::LoadError(_))));
    }

    #[test]
    fn test_missing_file() {
        let res: Result<u32> = read_record("target/tests/no_such_model.json");
        assert!(matches!(res, Err(GpError::LoadIoError(_))));
    }
}

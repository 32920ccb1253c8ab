pub mod draw_map;
pub mod fetch_osm;
pub mod parse_osm;

use std::{fs, path::Path};
use log::{info, error};

use crate::errors::Result;


pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    fn is_cached(&self, dir: &Path) -> Result<bool>;
    fn clean(&self, dir: &Path) -> Result<()>;

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        if self.is_cached(dir)? {
            info!(etl_name = self.etl_name(); "Using cached value");
        } else {
            info!(etl_name = self.etl_name(); "Extracting");
            let input = match self.extract(dir) {
                Ok(input) => Ok(input),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Extraction failed with error");
                    Err(err)
                },
            }?;

            info!(etl_name = self.etl_name(); "Transforming");
            let output = match self.transform(input) {
                Ok(output) => Ok(output),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Transformation failed with error");
                    Err(err)
                },
            }?;

            info!(etl_name = self.etl_name(); "Loading");
            match self.load(dir, output) {
                Ok(_) => Ok(()),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Loading failed with error");
                    Err(err)
                },
            }?;
        }
        info!(etl_name = self.etl_name(); "Process finished");
        Ok(())
    }

    /// Like `process`, but throws away a cached result first.
    fn refresh(&mut self, dir: &Path) -> Result<()> {
        info!(etl_name = self.etl_name(); "Cleaning cached value");
        self.clean(dir)?;
        self.process(dir)
    }
}

/// An output counts as cached when it exists and is not older than what it was made from.
fn is_up_to_date(output: &Path, input: &Path) -> Result<bool> {
    if !output.try_exists()? {
        return Ok(false);
    }
    if !input.try_exists()? {
        return Ok(true);
    }
    let output_modified = fs::metadata(output)?.modified()?;
    let input_modified = fs::metadata(input)?.modified()?;
    Ok(output_modified >= input_modified)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.try_exists()? {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn is_xz_file(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension.eq_ignore_ascii_case("xz"))
}

/// Writes `contents` to `path`, creating missing parent directories.
fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_output_is_not_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.osm");
        fs::write(&input, "<osm/>").unwrap();

        assert!(!is_up_to_date(&dir.path().join("out.svg"), &input).unwrap());
    }

    #[test]
    fn output_written_after_input_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.osm");
        let output = dir.path().join("nested").join("out.svg");
        fs::write(&input, "<osm/>").unwrap();
        write_file(&output, b"<svg/>").unwrap();

        assert!(is_up_to_date(&output, &input).unwrap());
    }

    #[test]
    fn removing_a_missing_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();

        remove_if_exists(&dir.path().join("nothing.here")).unwrap();
    }
}

use super::*;

/// Input and output names must stay inside the sandbox tmpfs, so only plain
/// single-component names are accepted.
pub fn validate_filename(filename: &str) -> Result {
  ensure!(
    !filename.is_empty(),
    Error::InputFile("empty filename".into())
  );

  ensure!(
    !filename.contains('/') && filename != "." && filename != "..",
    Error::InputFile(format!("filename {filename:?} escapes the sandbox"))
  );

  Ok(())
}

/// Writes the requested input files into the tmpfs before the target runs.
pub fn materialize_input_files(tmp_dir: &Utf8Path, files: &[InputFile]) -> Result {
  for file in files {
    validate_filename(&file.filename)?;

    let path = tmp_dir.join(&file.filename);

    let mut handle = fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .mode(file.mode)
      .open(&path)
      .map_err(|e| Error::InputFile(format!("create {path}: {e}")))?;

    io::Write::write_all(&mut handle, &file.content)
      .map_err(|e| Error::InputFile(format!("write {path}: {e}")))?;
  }

  Ok(())
}

/// Collects artifacts after the run, preserving request order.
///
/// A file the target never created yields empty content.
pub fn collect_output_files(tmp_dir: &Utf8Path, filenames: &[String]) -> Vec<OutputFile> {
  filenames
    .iter()
    .map(|filename| OutputFile {
      filename: filename.clone(),
      content: read_or_empty(&tmp_dir.join(filename)),
    })
    .collect()
}

pub fn read_or_empty(path: &Utf8Path) -> Vec<u8> {
  fs::read(path).unwrap_or_default()
}

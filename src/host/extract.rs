//! Archive extraction into a destination directory.

use declarative::ActuationError;
use std::fs::{self, File};
use std::path::Path;

/// Extract a `.zip`, `.tar.gz`, or `.tgz` archive into `dest`
pub fn extract(archive: &Path, dest: &Path) -> Result<(), ActuationError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    fs::create_dir_all(dest)?;
    log::info!("extracting {} -> {}", archive.display(), dest.display());

    let file = File::open(archive).map_err(|e| {
        ActuationError::failed(format!("Failed to open {}: {}", archive.display(), e))
    })?;

    if name.ends_with(".zip") {
        extract_zip(file, dest)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_targz(file, dest)
    } else {
        Err(ActuationError::Unsupported(format!(
            "unknown archive format: {}",
            archive.display()
        )))
    }
}

fn extract_zip(file: File, dest: &Path) -> Result<(), ActuationError> {
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ActuationError::failed(format!("Invalid zip archive: {}", e)))?;
    archive
        .extract(dest)
        .map_err(|e| ActuationError::failed(format!("Failed to extract zip archive: {}", e)))
}

fn extract_targz(file: File, dest: &Path) -> Result<(), ActuationError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(|e| ActuationError::failed(format!("Failed to extract tar archive: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extract_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("logstash-8.5.0.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("logstash-8.5.0/Gemfile", options).unwrap();
            zip.write_all(b"gem \"logstash-core\"\n").unwrap();
            zip.start_file("logstash-8.5.0/bin/logstash-plugin.bat", options)
                .unwrap();
            zip.write_all(b"@echo off\r\n").unwrap();
            zip.finish().unwrap();
        }

        let dest = dir.path().join("logstash");
        extract(&archive, &dest).unwrap();
        assert_eq!(
            fs::read_to_string(dest.join("logstash-8.5.0/Gemfile")).unwrap(),
            "gem \"logstash-core\"\n"
        );
        assert!(dest.join("logstash-8.5.0/bin/logstash-plugin.bat").exists());
    }

    #[test]
    fn test_extract_targz() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("logstash-8.5.0.tar.gz");
        {
            let encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"gem \"logstash-core\"\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "logstash-8.5.0/Gemfile", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();
        assert!(dest.join("logstash-8.5.0/Gemfile").exists());
    }

    #[test]
    fn test_extract_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("logstash.rar");
        fs::write(&archive, b"rar").unwrap();
        let err = extract(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ActuationError::Unsupported(_)));
    }

    #[test]
    fn test_extract_corrupt_zip_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"not a zip").unwrap();
        let err = extract(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.is_retryable());
    }
}

use std::path::Path;

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{InMemDicomObject, OpenFileOptions};
use tracing::debug;

/// Identifiers read from one DICOM file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstance {
    pub sop_instance_uid: String,
    pub sop_class_uid: String,
    pub transfer_syntax: String,
    pub study_instance_uid: Option<String>,
}

/// Reads the identifiers needed to queue a file for sending.
///
/// Returns `None` for anything that is not a usable DICOM instance.
pub trait InstanceParser: Send + Sync {
    fn parse_item(&self, path: &Path) -> Option<ParsedInstance>;
}

/// Parser for DICOM Part 10 files
#[derive(Debug, Clone, Default)]
pub struct DicomFileParser;

impl DicomFileParser {
    pub fn new() -> Self {
        Self
    }
}

impl InstanceParser for DicomFileParser {
    fn parse_item(&self, path: &Path) -> Option<ParsedInstance> {
        // identifiers all precede the pixel data
        let obj = match OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
        {
            Ok(obj) => obj,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                return None;
            }
        };

        let meta = obj.meta();
        let sop_instance_uid = element_uid(&obj, tags::SOP_INSTANCE_UID)
            .or_else(|| non_empty_uid(meta.media_storage_sop_instance_uid()))?;
        let sop_class_uid = element_uid(&obj, tags::SOP_CLASS_UID)
            .or_else(|| non_empty_uid(meta.media_storage_sop_class_uid()))?;
        let transfer_syntax = non_empty_uid(meta.transfer_syntax())?;
        let study_instance_uid = element_uid(&obj, tags::STUDY_INSTANCE_UID);

        Some(ParsedInstance {
            sop_instance_uid,
            sop_class_uid,
            transfer_syntax,
            study_instance_uid,
        })
    }
}

fn element_uid(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = obj.element(tag).ok()?;
    let value = element.to_str().ok()?;
    non_empty_uid(&value)
}

/// UIDs are padded to even length with NUL, other strings with spaces
fn non_empty_uid(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end_matches(['\0', ' ']).trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{DataElement, PrimitiveValue, VR};
    use dicom_dictionary_std::uids;
    use dicom_object::meta::FileMetaTableBuilder;
    use tempfile::TempDir;

    fn write_instance(path: &Path, study: &str, sop: &str, class: &str, ts: &str) {
        let obj = InMemDicomObject::from_element_iter([
            DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(class)),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(sop)),
            DataElement::new(tags::STUDY_INSTANCE_UID, VR::UI, PrimitiveValue::from(study)),
        ]);
        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(ts)
                    .media_storage_sop_class_uid(class)
                    .media_storage_sop_instance_uid(sop),
            )
            .expect("build file meta");
        file.write_to_file(path).expect("write part 10");
    }

    #[test]
    fn test_parses_identifiers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ct1.dcm");
        write_instance(
            &path,
            "1.2.3",
            "1.2.3.4.1",
            uids::CT_IMAGE_STORAGE,
            uids::EXPLICIT_VR_LITTLE_ENDIAN,
        );

        let parsed = DicomFileParser::new().parse_item(&path).expect("parsed");
        assert_eq!(parsed.sop_instance_uid, "1.2.3.4.1");
        assert_eq!(parsed.sop_class_uid, uids::CT_IMAGE_STORAGE);
        assert_eq!(parsed.transfer_syntax, uids::EXPLICIT_VR_LITTLE_ENDIAN);
        assert_eq!(parsed.study_instance_uid.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn test_non_dicom_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not a dicom file").unwrap();

        assert!(DicomFileParser::new().parse_item(&path).is_none());
        assert!(DicomFileParser::new().parse_item(&dir.path().join("missing.dcm")).is_none());
    }

    #[test]
    fn test_uid_padding_is_trimmed() {
        assert_eq!(non_empty_uid("1.2.840.10008.1.2.1\0"), Some("1.2.840.10008.1.2.1".into()));
        assert_eq!(non_empty_uid("1.2.3 "), Some("1.2.3".into()));
        assert_eq!(non_empty_uid("\0"), None);
    }
}

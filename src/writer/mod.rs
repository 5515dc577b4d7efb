pub(crate) mod driver;
mod objstm;
mod tables;
pub(crate) mod unparse;
mod xref;

pub use tables::{NewObjEntry, NewObjTable, NewXref, ObjEntry, ObjTable};

use crate::crypto::encryption::{Encryption, R3Permissions};
use crate::document::{Document, PdfVersion};
use crate::error::{WriteError, WriteResult};
use crate::filters::DecodeLevel;
use driver::Driver;
use std::collections::BTreeMap;
use std::io::Write;

/// What to do with object streams on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectStreamMode {
    #[default]
    Disable,
    Preserve,
    Generate,
}

/// Shorthand for the common decode-level / compress-streams pairings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDataMode {
    Uncompress,
    Preserve,
    Compress,
}

/// The full writer configuration record. Setters enforce the mutual
/// exclusion rules at option-setting time; mode cross-effects (QDF
/// defaults, PCLm restrictions) are applied here and during write setup.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub(crate) object_streams: ObjectStreamMode,
    pub(crate) compress_streams: bool,
    compress_streams_set: bool,
    pub(crate) decode_level: DecodeLevel,
    decode_level_set: bool,
    pub(crate) recompress_flate: bool,
    pub(crate) normalize_content: bool,
    normalize_content_set: bool,
    pub(crate) qdf: bool,
    pub(crate) linearize: bool,
    pub(crate) pclm: bool,
    pub(crate) preserve_encryption: bool,
    pub(crate) preserve_unreferenced: bool,
    pub(crate) newline_before_endstream: bool,
    pub(crate) deterministic_id: bool,
    pub(crate) static_id: bool,
    pub(crate) no_original_object_ids: bool,
    pub(crate) direct_stream_lengths: bool,
    pub(crate) encrypt_use_aes: bool,
    pub(crate) forced_pdf_version: Option<(String, i32)>,
    pub(crate) extra_header_text: String,
    pub(crate) linearize_pass1: Option<std::path::PathBuf>,
    pub(crate) static_aes_iv: bool,
    pub(crate) output_name: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            object_streams: ObjectStreamMode::Disable,
            compress_streams: true,
            compress_streams_set: false,
            decode_level: DecodeLevel::Generalized,
            decode_level_set: false,
            recompress_flate: false,
            normalize_content: false,
            normalize_content_set: false,
            qdf: false,
            linearize: false,
            pclm: false,
            preserve_encryption: true,
            preserve_unreferenced: false,
            newline_before_endstream: false,
            deterministic_id: false,
            static_id: false,
            no_original_object_ids: false,
            direct_stream_lengths: true,
            encrypt_use_aes: false,
            forced_pdf_version: None,
            extra_header_text: String::new(),
            linearize_pass1: None,
            static_aes_iv: false,
            output_name: "unspecified".to_string(),
        }
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_streams(&mut self, mode: ObjectStreamMode) -> &mut Self {
        self.object_streams = mode;
        self
    }

    pub fn stream_data(&mut self, mode: StreamDataMode) -> WriteResult<&mut Self> {
        match mode {
            StreamDataMode::Uncompress => {
                self.set_decode_level(self.decode_level.max(DecodeLevel::Generalized))?;
                self.set_compress_streams(false)?;
            }
            StreamDataMode::Preserve => {
                self.set_decode_level(DecodeLevel::None)?;
                self.set_compress_streams(false)?;
            }
            StreamDataMode::Compress => {
                self.set_decode_level(self.decode_level.max(DecodeLevel::Generalized))?;
                self.set_compress_streams(true)?;
            }
        }
        Ok(self)
    }

    pub fn set_compress_streams(&mut self, val: bool) -> WriteResult<&mut Self> {
        if self.pclm {
            return Err(WriteError::usage(
                "compress_streams cannot be set when pclm is set",
            ));
        }
        self.compress_streams_set = true;
        self.compress_streams = val;
        Ok(self)
    }

    pub fn set_decode_level(&mut self, val: DecodeLevel) -> WriteResult<&mut Self> {
        if self.pclm {
            return Err(WriteError::usage(
                "stream_decode_level cannot be set when pclm is set",
            ));
        }
        self.decode_level_set = true;
        self.decode_level = val;
        Ok(self)
    }

    pub fn recompress_flate(&mut self, val: bool) -> &mut Self {
        self.recompress_flate = val;
        self
    }

    pub fn normalize_content(&mut self, val: bool) -> &mut Self {
        self.normalize_content_set = true;
        self.normalize_content = val;
        self
    }

    pub fn qdf(&mut self, val: bool) -> WriteResult<&mut Self> {
        if self.pclm || self.linearize {
            return Err(WriteError::usage(
                "qdf cannot be set when linearize or pclm are set",
            ));
        }
        self.qdf = val;
        if val {
            if !self.normalize_content_set {
                self.normalize_content(true);
            }
            if !self.compress_streams_set {
                self.compress_streams = false;
            }
            if !self.decode_level_set {
                self.decode_level = DecodeLevel::Generalized;
            }
            self.preserve_encryption = false;
            // Indirect stream lengths in QDF mode: the fixup tool stores
            // recomputed lengths in the companion objects. Object streams,
            // xref streams and hint streams always get direct lengths.
            self.direct_stream_lengths = false;
        }
        Ok(self)
    }

    pub fn preserve_unreferenced(&mut self, val: bool) -> &mut Self {
        self.preserve_unreferenced = val;
        self
    }

    pub fn newline_before_endstream(&mut self, val: bool) -> &mut Self {
        self.newline_before_endstream = val;
        self
    }

    pub fn preserve_encryption(&mut self, val: bool) -> WriteResult<&mut Self> {
        if val && self.qdf {
            return Err(WriteError::usage(
                "preserve_encryption cannot be set when qdf is set",
            ));
        }
        self.preserve_encryption = val;
        Ok(self)
    }

    pub fn linearize(&mut self, val: bool) -> WriteResult<&mut Self> {
        if self.pclm || self.qdf {
            return Err(WriteError::usage(
                "linearize cannot be set when qdf or pclm are set",
            ));
        }
        self.linearize = val;
        Ok(self)
    }

    pub fn linearize_pass1(&mut self, path: impl Into<std::path::PathBuf>) -> &mut Self {
        self.linearize_pass1 = Some(path.into());
        self
    }

    pub fn pclm(&mut self, val: bool) -> WriteResult<&mut Self> {
        if self.decode_level_set || self.compress_streams_set || self.linearize || self.qdf {
            return Err(WriteError::usage(
                "pclm cannot be set when stream_decode_level, compress_streams, linearize or qdf are set",
            ));
        }
        self.pclm = val;
        if val {
            self.decode_level = DecodeLevel::None;
            self.compress_streams = false;
            self.linearize = false;
        }
        Ok(self)
    }

    pub fn deterministic_id(&mut self, val: bool) -> &mut Self {
        self.deterministic_id = val;
        self
    }

    pub fn static_id(&mut self, val: bool) -> &mut Self {
        self.static_id = val;
        self
    }

    pub fn static_aes_iv(&mut self, val: bool) -> &mut Self {
        self.static_aes_iv = val;
        self
    }

    pub fn no_original_object_ids(&mut self, val: bool) -> &mut Self {
        self.no_original_object_ids = val;
        self
    }

    pub fn forced_pdf_version(&mut self, version: impl Into<String>, extension_level: i32) -> &mut Self {
        self.forced_pdf_version = Some((version.into(), extension_level));
        self
    }

    pub fn extra_header_text(&mut self, text: impl Into<String>) -> &mut Self {
        let mut text = text.into();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        self.extra_header_text = text;
        self
    }

    /// Name recorded in the non-deterministic `/ID` seed; cosmetic only.
    pub fn output_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.output_name = name.into();
        self
    }
}

/// Progress callback, reported as a percentage from 0 to 100.
pub type ProgressReporter<'p> = Box<dyn FnMut(i32) + 'p>;

/// The public writer: owns the configuration and requested encryption and
/// runs the serialization over a caller-supplied sink.
pub struct PdfWriter<'a, 'p> {
    doc: &'a mut Document,
    config: WriterConfig,
    encryption: Option<Encryption>,
    encryption_key: Vec<u8>,
    id1: Vec<u8>,
    id2: Vec<u8>,
    min_version: PdfVersion,
    min_extension_level: i32,
    progress: Option<ProgressReporter<'p>>,
    written_xref: BTreeMap<u32, NewXref>,
}

impl<'a, 'p> PdfWriter<'a, 'p> {
    pub fn new(doc: &'a mut Document, config: WriterConfig) -> Self {
        PdfWriter {
            doc,
            config,
            encryption: None,
            encryption_key: Vec::new(),
            id1: Vec::new(),
            id2: Vec::new(),
            min_version: PdfVersion::new(1, 0),
            min_extension_level: 0,
            progress: None,
            written_xref: BTreeMap::new(),
        }
    }

    /// The cross-reference entries of the last completed write, keyed by
    /// output object number.
    pub fn written_xref_table(&self) -> &BTreeMap<u32, NewXref> {
        &self.written_xref
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn register_progress_reporter(&mut self, reporter: ProgressReporter<'p>) {
        self.progress = Some(reporter);
    }

    /// 40-bit RC4 (V1 R2).
    pub fn set_r2_encryption(
        &mut self,
        user_password: &str,
        owner_password: &str,
        allow_print: bool,
        allow_modify: bool,
        allow_extract: bool,
        allow_annotate: bool,
    ) -> WriteResult<()> {
        let mut enc = Encryption::new(1, 2, 5, true);
        if !allow_print {
            enc.set_p(3, false);
        }
        if !allow_modify {
            enc.set_p(4, false);
        }
        if !allow_extract {
            enc.set_p(5, false);
        }
        if !allow_annotate {
            enc.set_p(6, false);
        }
        self.install_encryption(enc, user_password, owner_password)
    }

    /// 128-bit RC4 (V2 R3).
    pub fn set_r3_encryption(
        &mut self,
        user_password: &str,
        owner_password: &str,
        permissions: R3Permissions,
    ) -> WriteResult<()> {
        let mut enc = Encryption::new(2, 3, 16, true);
        enc.apply_r3_permissions(permissions);
        self.install_encryption(enc, user_password, owner_password)
    }

    /// 128-bit RC4 or AES (V4 R4).
    pub fn set_r4_encryption(
        &mut self,
        user_password: &str,
        owner_password: &str,
        permissions: R3Permissions,
        encrypt_metadata: bool,
        use_aes: bool,
    ) -> WriteResult<()> {
        let mut enc = Encryption::new(4, 4, 16, encrypt_metadata);
        enc.apply_r3_permissions(permissions);
        self.config.encrypt_use_aes = use_aes;
        self.install_encryption(enc, user_password, owner_password)
    }

    /// Deprecated AES-256 (V5 R5).
    pub fn set_r5_encryption(
        &mut self,
        user_password: &str,
        owner_password: &str,
        permissions: R3Permissions,
        encrypt_metadata: bool,
    ) -> WriteResult<()> {
        let mut enc = Encryption::new(5, 5, 32, encrypt_metadata);
        enc.apply_r3_permissions(permissions);
        self.config.encrypt_use_aes = true;
        self.install_encryption(enc, user_password, owner_password)
    }

    /// AES-256 (V5 R6).
    pub fn set_r6_encryption(
        &mut self,
        user_password: &str,
        owner_password: &str,
        permissions: R3Permissions,
        encrypt_metadata: bool,
    ) -> WriteResult<()> {
        let mut enc = Encryption::new(5, 6, 32, encrypt_metadata);
        enc.apply_r3_permissions(permissions);
        self.config.encrypt_use_aes = true;
        self.install_encryption(enc, user_password, owner_password)
    }

    fn install_encryption(
        &mut self,
        mut enc: Encryption,
        user_password: &str,
        owner_password: &str,
    ) -> WriteResult<()> {
        driver::generate_id(self.doc, &self.config, true, "", &mut self.id1, &mut self.id2)?;
        enc.set_id1(self.id1.clone());
        self.encryption_key = enc
            .compute_parameters(user_password, owner_password)
            .map_err(|e| WriteError::data(e.to_string()))?;
        let (version, level) = encryption_minimum_version(&enc, self.config.encrypt_use_aes);
        if compare_versions(version, self.min_version) > 0
            || (compare_versions(version, self.min_version) == 0 && level > self.min_extension_level)
        {
            self.min_version = version;
            self.min_extension_level = level;
        }
        self.encryption = Some(enc);
        Ok(())
    }

    /// Serialize the document to `out`.
    pub fn write_to(&mut self, out: &mut dyn Write) -> WriteResult<()> {
        let mut driver = Driver::new(
            self.doc,
            &mut self.config,
            self.encryption.clone(),
            self.encryption_key.clone(),
            self.id1.clone(),
            self.id2.clone(),
            self.min_version,
            self.min_extension_level,
            out,
            self.progress.as_mut(),
        );
        driver.write()?;
        let written = driver.written_xref_table();
        drop(driver);
        self.written_xref = written;
        Ok(())
    }

    /// Serialize the document into a fresh buffer.
    pub fn write_to_memory(&mut self) -> WriteResult<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

pub(crate) fn compare_versions(a: PdfVersion, b: PdfVersion) -> i32 {
    if a.major != b.major {
        return if a.major < b.major { -1 } else { 1 };
    }
    match a.minor.cmp(&b.minor) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

pub(crate) fn encryption_minimum_version(enc: &Encryption, use_aes: bool) -> (PdfVersion, i32) {
    match enc.r() {
        r if r >= 6 => (PdfVersion::new(1, 7), 8),
        5 => (PdfVersion::new(1, 7), 3),
        4 => (
            if use_aes {
                PdfVersion::new(1, 6)
            } else {
                PdfVersion::new(1, 5)
            },
            0,
        ),
        3 => (PdfVersion::new(1, 4), 0),
        _ => (PdfVersion::new(1, 3), 0),
    }
}

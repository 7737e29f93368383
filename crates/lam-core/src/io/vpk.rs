//! Minimal reader for Valve Pak (`.vpk`) archives.
//!
//! Only what the addon manager needs: recognizing the format, walking the
//! directory tree, and pulling small embedded files (`addoninfo.txt`) out of
//! single-file addon archives.

use std::io::{Read, Seek, SeekFrom};

use thiserror::Error;

/// Little-endian signature at offset 0 of every VPK.
pub const VPK_SIGNATURE: u32 = 0x55AA_1234;

/// Archive index meaning "data follows the tree in this same file".
const EMBEDDED_ARCHIVE: u16 = 0x7FFF;
const ENTRY_TERMINATOR: u16 = 0xFFFF;
const MAX_TREE_SIZE: u32 = 64 * 1024 * 1024;
const MAX_EMBEDDED_READ: u32 = 1024 * 1024;

/// Why a file could not be read as a VPK archive.
#[derive(Error, Debug)]
pub enum VpkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a VPK archive (signature {0:#010x})")]
    BadSignature(u32),

    #[error("unsupported VPK version {0}")]
    UnsupportedVersion(u32),

    #[error("directory tree is truncated or corrupt")]
    CorruptTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpkHeader {
    pub version: u32,
    pub tree_size: u32,
    header_len: u32,
}

impl VpkHeader {
    /// Offset of the embedded data section.
    pub fn data_offset(&self) -> u64 {
        u64::from(self.header_len) + u64::from(self.tree_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpkEntry {
    /// Full path inside the archive, `/`-separated, without a leading slash.
    pub path: String,
    pub crc: u32,
    pub preload: Vec<u8>,
    pub archive_index: u16,
    pub offset: u32,
    pub length: u32,
}

impl VpkEntry {
    pub fn is_embedded(&self) -> bool {
        self.archive_index == EMBEDDED_ARCHIVE
    }
}

#[derive(Debug, Clone)]
pub struct VpkDirectory {
    pub header: VpkHeader,
    pub entries: Vec<VpkEntry>,
}

/// Whether `bytes` starts with the VPK signature.
pub fn has_signature(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == VPK_SIGNATURE
}

impl VpkDirectory {
    /// Reads the header and directory tree.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, VpkError> {
        reader.seek(SeekFrom::Start(0))?;
        let signature = read_u32(reader)?;
        if signature != VPK_SIGNATURE {
            return Err(VpkError::BadSignature(signature));
        }
        let version = read_u32(reader)?;
        let tree_size = read_u32(reader)?;
        let header_len = match version {
            1 => 12,
            2 => {
                // file data, archive md5, other md5, signature section sizes
                let mut skip = [0u8; 16];
                reader.read_exact(&mut skip)?;
                28
            }
            v => return Err(VpkError::UnsupportedVersion(v)),
        };
        if tree_size > MAX_TREE_SIZE {
            return Err(VpkError::CorruptTree);
        }

        let mut tree = vec![0u8; tree_size as usize];
        reader
            .read_exact(&mut tree)
            .map_err(|_| VpkError::CorruptTree)?;

        Ok(Self {
            header: VpkHeader {
                version,
                tree_size,
                header_len,
            },
            entries: parse_tree(&tree)?,
        })
    }

    pub fn find(&self, path: &str) -> Option<&VpkEntry> {
        self.entries
            .iter()
            .find(|e| e.path.eq_ignore_ascii_case(path))
    }

    /// Reads an embedded file's contents (preload bytes followed by data).
    ///
    /// Returns `None` for entries stored in sibling `_NNN.vpk` chunks or
    /// larger than the embedded-read limit.
    pub fn read_file<R: Read + Seek>(
        &self,
        reader: &mut R,
        path: &str,
    ) -> Result<Option<Vec<u8>>, VpkError> {
        let Some(entry) = self.find(path) else {
            return Ok(None);
        };
        if entry.length > 0 && !entry.is_embedded() {
            return Ok(None);
        }
        if entry.length > MAX_EMBEDDED_READ {
            return Ok(None);
        }

        let mut out = entry.preload.clone();
        if entry.length > 0 {
            let start = self.header.data_offset() + u64::from(entry.offset);
            reader.seek(SeekFrom::Start(start))?;
            let mut data = vec![0u8; entry.length as usize];
            reader
                .read_exact(&mut data)
                .map_err(|_| VpkError::CorruptTree)?;
            out.extend_from_slice(&data);
        }
        Ok(Some(out))
    }
}

/// Title declared by the archive's `addoninfo.txt`, if any.
pub fn addon_title<R: Read + Seek>(reader: &mut R) -> Result<Option<String>, VpkError> {
    let dir = VpkDirectory::read(reader)?;
    let Some(raw) = dir.read_file(reader, "addoninfo.txt")? else {
        return Ok(None);
    };
    Ok(parse_addoninfo_title(&String::from_utf8_lossy(&raw)))
}

/// Extracts `addontitle` from KeyValues text.
pub fn parse_addoninfo_title(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.split("//").next().unwrap_or_default().trim();
        let Some((key, rest)) = split_token(line) else {
            continue;
        };
        if !key.eq_ignore_ascii_case("addontitle") {
            continue;
        }
        let value = match split_token(rest.trim_start()) {
            Some((v, _)) if rest.trim_start().starts_with('"') => v.to_string(),
            _ => rest.trim().to_string(),
        };
        let value = value.trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

// First token of a KeyValues line: quoted string or run of non-space.
fn split_token(s: &str) -> Option<(&str, &str)> {
    if let Some(stripped) = s.strip_prefix('"') {
        let end = stripped.find('"')?;
        return Some((&stripped[..end], &stripped[end + 1..]));
    }
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, VpkError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => VpkError::BadSignature(0),
        _ => VpkError::Io(e),
    })?;
    Ok(u32::from_le_bytes(buf))
}

struct TreeCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TreeCursor<'a> {
    fn cstr(&mut self) -> Result<&'a str, VpkError> {
        let rest = self.buf.get(self.pos..).ok_or(VpkError::CorruptTree)?;
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(VpkError::CorruptTree)?;
        let s = std::str::from_utf8(&rest[..len]).map_err(|_| VpkError::CorruptTree)?;
        self.pos += len + 1;
        Ok(s)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], VpkError> {
        let end = self.pos.checked_add(n).ok_or(VpkError::CorruptTree)?;
        let out = self.buf.get(self.pos..end).ok_or(VpkError::CorruptTree)?;
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, VpkError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, VpkError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn parse_tree(tree: &[u8]) -> Result<Vec<VpkEntry>, VpkError> {
    let mut cur = TreeCursor { buf: tree, pos: 0 };
    let mut entries = Vec::new();

    loop {
        let ext = cur.cstr()?;
        if ext.is_empty() {
            break;
        }
        loop {
            let dir = cur.cstr()?;
            if dir.is_empty() {
                break;
            }
            loop {
                let name = cur.cstr()?;
                if name.is_empty() {
                    break;
                }
                let crc = cur.u32()?;
                let preload_len = cur.u16()?;
                let archive_index = cur.u16()?;
                let offset = cur.u32()?;
                let length = cur.u32()?;
                if cur.u16()? != ENTRY_TERMINATOR {
                    return Err(VpkError::CorruptTree);
                }
                let preload = cur.bytes(preload_len as usize)?.to_vec();

                let file = if ext == " " {
                    name.to_string()
                } else {
                    format!("{name}.{ext}")
                };
                let path = if dir == " " {
                    file
                } else {
                    format!("{}/{file}", dir.trim_matches('/'))
                };

                entries.push(VpkEntry {
                    path,
                    crc,
                    preload,
                    archive_index,
                    offset,
                    length,
                });
            }
        }
    }

    Ok(entries)
}

/// Builds a v1 archive with the given files in its directory tree.
#[cfg(any(test, feature = "test-util"))]
pub fn build_single_file(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tree = Vec::new();
    let mut data = Vec::new();

    for (path, contents) in files {
        let (dir, file) = path.rsplit_once('/').unwrap_or((" ", path));
        let (name, ext) = file.rsplit_once('.').unwrap_or((file, " "));
        for s in [ext, dir, name] {
            tree.extend_from_slice(s.as_bytes());
            tree.push(0);
        }
        tree.extend_from_slice(&0u32.to_le_bytes());
        tree.extend_from_slice(&0u16.to_le_bytes());
        tree.extend_from_slice(&EMBEDDED_ARCHIVE.to_le_bytes());
        tree.extend_from_slice(&(data.len() as u32).to_le_bytes());
        tree.extend_from_slice(&(contents.len() as u32).to_le_bytes());
        tree.extend_from_slice(&ENTRY_TERMINATOR.to_le_bytes());
        tree.extend_from_slice(&[0, 0]);
        data.extend_from_slice(contents);
    }
    tree.push(0);

    let mut out = Vec::new();
    out.extend_from_slice(&VPK_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(tree.len() as u32).to_le_bytes());
    out.extend_from_slice(&tree);
    out.extend_from_slice(&data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_embedded_addoninfo() {
        let info = b"\"AddonInfo\"\n{\n  addonSteamAppID 550\n  addontitle \"Better Pistols\"\n}\n";
        let bytes = build_single_file(&[
            ("models/weapons/pistol.mdl", b"MDL"),
            ("addoninfo.txt", info),
        ]);
        assert!(has_signature(&bytes));

        let mut cursor = Cursor::new(&bytes);
        let dir = VpkDirectory::read(&mut cursor).unwrap();
        assert_eq!(dir.entries.len(), 2);
        assert_eq!(dir.entries[0].path, "models/weapons/pistol.mdl");
        assert_eq!(dir.entries[1].path, "addoninfo.txt");

        let title = addon_title(&mut cursor).unwrap();
        assert_eq!(title.as_deref(), Some("Better Pistols"));
    }

    #[test]
    fn test_archive_without_addoninfo() {
        let bytes = build_single_file(&[("sound/a.wav", b"RIFF")]);
        assert_eq!(addon_title(&mut Cursor::new(&bytes)).unwrap(), None);
    }

    #[test]
    fn test_rejects_non_vpk() {
        let err = VpkDirectory::read(&mut Cursor::new(b"PK\x03\x04 zip file")).unwrap_err();
        assert!(matches!(err, VpkError::BadSignature(_)));
        assert!(!has_signature(b"PK"));
    }

    #[test]
    fn test_truncated_tree() {
        let mut bytes = build_single_file(&[("addoninfo.txt", b"addontitle x")]);
        bytes.truncate(20);
        let err = VpkDirectory::read(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, VpkError::CorruptTree));
    }

    #[test]
    fn test_addoninfo_title_forms() {
        assert_eq!(
            parse_addoninfo_title("\"addontitle\" \"Quoted Key\""),
            Some("Quoted Key".to_string())
        );
        assert_eq!(
            parse_addoninfo_title("AddonTitle Bare Words // comment"),
            Some("Bare Words".to_string())
        );
        assert_eq!(parse_addoninfo_title("addontitle \"\""), None);
        assert_eq!(parse_addoninfo_title("addonversion 1.0"), None);
    }
}

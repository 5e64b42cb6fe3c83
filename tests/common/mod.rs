#![allow(dead_code)]

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use rs2reader::{djb2::djb2_hash, js5_compression::Compression, XteaKey};

pub use rs2reader::xtea::xtea_encipher;
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub const SECTOR_SIZE: usize = 520;
pub const KEY: XteaKey = [0x00112233, 0x44556677, 0x8899AABB, 0xCCDDEEFF];

pub fn setup() {
    // a builder for `FmtSubscriber`.
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level higher than TRACE (e.g, debug, info, warn, etc.)
        // will be written to stdout.
        .with_max_level(Level::TRACE)
        .with_test_writer()
        // completes the builder.
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// A group to write into a fixture cache.
pub struct GroupBuilder {
    files: Vec<(u32, Vec<u8>)>,
    stripes: usize,
    name: Option<String>,
    compression: Compression,
    key: Option<XteaKey>,
    version: Option<u16>,
}

impl GroupBuilder {
    pub fn single(data: &[u8]) -> GroupBuilder {
        Self::files(&[(0, data)])
    }

    pub fn files(files: &[(u32, &[u8])]) -> GroupBuilder {
        GroupBuilder {
            files: files.iter().map(|(id, data)| (*id, data.to_vec())).collect(),
            stripes: 1,
            name: None,
            compression: Compression::None,
            key: None,
            version: None,
        }
    }

    pub fn stripes(mut self, stripes: usize) -> Self {
        self.stripes = stripes;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn compressed(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn encrypted(mut self, key: XteaKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = Some(version);
        self
    }

    /// The decompressed group: file chunks stripe by stripe, then the trailer.
    pub fn encode(&self) -> Vec<u8> {
        if self.files.len() == 1 {
            return self.files[0].1.clone();
        }

        let chunk = |data: &[u8], stripe: usize| {
            let start = stripe * data.len() / self.stripes;
            let end = (stripe + 1) * data.len() / self.stripes;
            data[start..end].to_vec()
        };

        let mut buf = Vec::new();
        for stripe in 0..self.stripes {
            for (_, data) in &self.files {
                buf.extend(chunk(data, stripe));
            }
        }
        for stripe in 0..self.stripes {
            let mut prev = 0i32;
            for (_, data) in &self.files {
                let len = chunk(data, stripe).len() as i32;
                buf.extend_from_slice(&(len - prev).to_be_bytes());
                prev = len;
            }
        }
        buf.push(self.stripes as u8);
        buf
    }

    /// The packed group and the crc32 the reference index records for it.
    pub fn pack(&self) -> (Vec<u8>, u32) {
        let data = self.encode();
        let mut packed = pack(self.compression, &data, self.key);
        let checksum = crc32fast::hash(&packed);
        if let Some(version) = self.version {
            packed.extend_from_slice(&version.to_be_bytes());
        }
        (packed, checksum)
    }
}

pub fn pack(compression: Compression, data: &[u8], key: Option<XteaKey>) -> Vec<u8> {
    let (type_id, payload) = match compression {
        Compression::None => (0, data.to_vec()),
        Compression::Bzip2 => (1, bzip2(data)),
        Compression::Gzip => (2, gzip(data)),
        Compression::Lzma => (3, lzma(data)),
    };

    let mut body = Vec::new();
    if type_id != 0 {
        body.extend_from_slice(&(data.len() as i32).to_be_bytes());
    }
    body.extend_from_slice(&payload);
    if let Some(key) = key {
        body = xtea_encipher(&body, &key);
    }

    let mut packed = vec![type_id];
    packed.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    packed.extend(body);
    packed
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

// Properties header only: the cache stores no unpacked size.
pub fn lzma(data: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    lzma_rs::lzma_compress_with_options(
        &mut &data[..],
        &mut compressed,
        &lzma_rs::compress::Options {
            unpacked_size: lzma_rs::compress::UnpackedSize::SkipWritingToHeader,
        },
    )
    .unwrap();
    compressed
}

// Headerless: the cache strips the "BZh1" magic.
pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    encoder.write_all(data).unwrap();
    let mut compressed = encoder.finish().unwrap();
    compressed.drain(..4);
    compressed
}

struct ReferenceGroup {
    name_hash: Option<i32>,
    checksum: u32,
    files: Vec<u32>,
}

/// Writes complete caches into a temporary directory.
pub struct CacheBuilder {
    legacy: bool,
    data: Vec<u8>,
    music_data: Option<Vec<u8>>,
    indexes: BTreeMap<u8, BTreeMap<u32, (u32, u32)>>,
    references: BTreeMap<u8, BTreeMap<u32, ReferenceGroup>>,
}

impl CacheBuilder {
    pub fn new() -> CacheBuilder {
        CacheBuilder {
            legacy: false,
            // Sector 0 is never used.
            data: vec![0; SECTOR_SIZE],
            music_data: None,
            indexes: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn legacy() -> CacheBuilder {
        CacheBuilder {
            legacy: true,
            ..Self::new()
        }
    }

    pub fn with_music_data(mut self) -> Self {
        self.music_data = Some(vec![0; SECTOR_SIZE]);
        self
    }

    /// Packs `group` and records it in the index file and reference index of `archive`.
    pub fn group(mut self, archive: u8, id: u32, group: GroupBuilder) -> Self {
        let (packed, checksum) = group.pack();
        self.write(archive, id, &packed);
        self.references.entry(archive).or_default().insert(
            id,
            ReferenceGroup {
                name_hash: group.name.as_deref().map(|name| djb2_hash(name) as i32),
                checksum,
                files: group.files.iter().map(|(id, _)| *id).collect(),
            },
        );
        self
    }

    /// Stores `packed` as is, with no reference index entry.
    pub fn raw(mut self, archive: u8, id: u32, packed: &[u8]) -> Self {
        self.write(archive, id, packed);
        self
    }

    fn write(&mut self, archive: u8, group: u32, packed: &[u8]) {
        let music = archive == 40 && self.music_data.is_some();
        let legacy = self.legacy;
        let data = match &mut self.music_data {
            Some(music_data) if music => music_data,
            _ => &mut self.data,
        };

        let sector = write_chain(data, legacy, archive, group, packed);
        self.indexes
            .entry(archive)
            .or_default()
            .insert(group, (packed.len() as u32, sector));
    }

    pub fn build(mut self) -> Fixture {
        if !self.legacy {
            let references = std::mem::take(&mut self.references);
            for (archive, groups) in &references {
                let packed = pack(Compression::None, &encode_reference(groups), None);
                self.write(255, *archive as u32, &packed);
            }
            // An archive set must exist even when the cache is empty.
            self.indexes.entry(255).or_default();
        }

        let dir = TempDir::new().unwrap();
        let data_name = if self.legacy {
            "main_file_cache.dat"
        } else {
            "main_file_cache.dat2"
        };
        fs::write(dir.path().join(data_name), &self.data).unwrap();
        if let Some(music_data) = &self.music_data {
            fs::write(dir.path().join("main_file_cache.dat2m"), music_data).unwrap();
        }

        let mut sectors = BTreeMap::new();
        for (archive, groups) in &self.indexes {
            let slots = groups.keys().next_back().map_or(0, |id| id + 1);
            let mut buf = vec![0; slots as usize * 6];
            for (group, (length, sector)) in groups {
                let pos = *group as usize * 6;
                buf[pos..pos + 3].copy_from_slice(&length.to_be_bytes()[1..]);
                buf[pos + 3..pos + 6].copy_from_slice(&sector.to_be_bytes()[1..]);
                sectors.insert((*archive, *group), *sector);
            }
            fs::write(dir.path().join(format!("main_file_cache.idx{archive}")), buf).unwrap();
        }

        Fixture { dir, sectors }
    }
}

// Appends the sector chain of a group and returns its first sector.
fn write_chain(data: &mut Vec<u8>, legacy: bool, archive: u8, group: u32, packed: &[u8]) -> u32 {
    let extended = group >= 65536;
    let header_size = if extended { 10 } else { 8 };
    let first = (data.len() / SECTOR_SIZE) as u32;
    let chunks: Vec<&[u8]> = packed.chunks(SECTOR_SIZE - header_size).collect();

    for (chunk, payload) in chunks.iter().enumerate() {
        let sector = first + chunk as u32;
        let next = if chunk + 1 == chunks.len() { 0 } else { sector + 1 };

        let mut buf = Vec::with_capacity(SECTOR_SIZE);
        if extended {
            buf.extend_from_slice(&group.to_be_bytes());
        } else {
            buf.extend_from_slice(&(group as u16).to_be_bytes());
        }
        buf.extend_from_slice(&(chunk as u16).to_be_bytes());
        buf.extend_from_slice(&next.to_be_bytes()[1..]);
        buf.push(if legacy { archive.wrapping_add(1) } else { archive });
        buf.extend_from_slice(payload);
        buf.resize(SECTOR_SIZE, 0);
        data.extend(buf);
    }

    first
}

// Protocol 6, or 7 once any id needs more than 16 bits.
fn encode_reference(groups: &BTreeMap<u32, ReferenceGroup>) -> Vec<u8> {
    let smart = groups.keys().any(|id| *id >= 65536)
        || groups.values().any(|group| group.files.iter().any(|id| *id >= 65536));
    let named = groups.values().any(|group| group.name_hash.is_some());

    let write_id = |buf: &mut Vec<u8>, id: u32| {
        if smart && id >= 32768 {
            buf.extend_from_slice(&(id | 0x8000_0000).to_be_bytes());
        } else {
            buf.extend_from_slice(&(id as u16).to_be_bytes());
        }
    };

    let mut buf = vec![if smart { 7 } else { 6 }];
    buf.extend_from_slice(&1i32.to_be_bytes());
    buf.push(if named { 0x1 } else { 0x0 });

    write_id(&mut buf, groups.len() as u32);
    let mut prev = 0;
    for id in groups.keys() {
        write_id(&mut buf, id - prev);
        prev = *id;
    }
    if named {
        for group in groups.values() {
            buf.extend_from_slice(&group.name_hash.unwrap_or(-1).to_be_bytes());
        }
    }
    for group in groups.values() {
        buf.extend_from_slice(&group.checksum.to_be_bytes());
    }
    for _ in groups.values() {
        buf.extend_from_slice(&1u32.to_be_bytes());
    }
    for group in groups.values() {
        write_id(&mut buf, group.files.len() as u32);
    }
    for group in groups.values() {
        let mut prev = 0;
        for id in &group.files {
            write_id(&mut buf, id - prev);
            prev = *id;
        }
    }
    if named {
        for group in groups.values() {
            for _ in &group.files {
                buf.extend_from_slice(&(-1i32).to_be_bytes());
            }
        }
    }
    buf
}

/// A cache written to disk; removed when dropped.
pub struct Fixture {
    dir: TempDir,
    sectors: BTreeMap<(u8, u32), u32>,
}

impl Fixture {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_path(&self) -> PathBuf {
        let legacy = self.dir.path().join("main_file_cache.dat");
        if legacy.exists() {
            legacy
        } else {
            self.dir.path().join("main_file_cache.dat2")
        }
    }

    pub fn first_sector(&self, archive: u8, group: u32) -> u32 {
        self.sectors[&(archive, group)]
    }

    /// Overwrites one byte of the data file at `offset` within `sector`.
    pub fn patch(&self, sector: u32, offset: usize, value: u8) {
        let path = self.data_path();
        let mut data = fs::read(&path).unwrap();
        data[sector as usize * SECTOR_SIZE + offset] = value;
        fs::write(path, data).unwrap();
    }
}

/// Options controlling how a cache is opened and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Compare the crc32 of every packed group against its reference index checksum.
    pub verify_checksums: bool,
    /// Read the music archive from `main_file_cache.dat2m` when that file exists.
    pub music_data: bool,
}

impl CacheOptions {
    pub fn verify_checksums(mut self, verify_checksums: bool) -> Self {
        self.verify_checksums = verify_checksums;
        self
    }

    pub fn music_data(mut self, music_data: bool) -> Self {
        self.music_data = music_data;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            music_data: true,
        }
    }
}

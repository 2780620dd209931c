use crate::types::DIR_NAME_HEX_WIDTH;

/// Static configuration for one participant's snapshot manager.
///
/// Constructed once at participant startup and handed to [`crate::manager::Manager::init`]
/// explicitly, rather than read from ambient global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size, in bytes, of each outbound chunk produced by `read`.
    pub chunk_size: usize,

    /// Hex width used when rendering `<term_hex>_<index_hex>` directory names.
    pub dir_name_hex_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk_size: 4 * 1024 * 1024,
            dir_name_hex_width: DIR_NAME_HEX_WIDTH,
        }
    }
}

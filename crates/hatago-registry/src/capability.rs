//! Cache of which discovery methods each upstream actually supports,
//! populated from `-32601` responses so the router can skip pointless
//! `*/list` calls on subsequent activations.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityStatus {
    Supported,
    Unsupported,
    Unknown,
}

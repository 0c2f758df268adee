use std::collections::HashMap;

/// `host:port` of a node's gRPC endpoint.
pub type Address = String;

/// Position on the identifier ring, already reduced mod 2^M.
pub type HashPos = u64;

/// Records of one owner arc: key id -> resolved addresses.
pub type RecordSet = HashMap<HashPos, Vec<String>>;

pub(crate) mod logging;

pub(crate) mod mem_block_store;

pub(crate) mod mem_db;

pub(crate) mod network;

pub(crate) mod node;

pub(crate) mod fixtures;

mod helpers;
mod ingest;
mod recipes;

pub(crate) use ingest::cmd_ingest;
pub(crate) use recipes::{Paging, cmd_list, cmd_search, cmd_show};

mod test_builder;
mod test_cache;
mod test_gcra;
mod test_leaky_bucket;
mod test_memory_store;
mod test_options;
mod test_token_bucket;

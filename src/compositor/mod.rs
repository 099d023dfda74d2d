pub(crate) mod property_tree_manager;

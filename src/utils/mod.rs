pub(crate) mod whichever;

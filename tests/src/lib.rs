//! End-to-end discovery cycles over scripted shell and HTTP transports, reconciled
//! into the in-memory inventory.

#[cfg(test)]
mod fakes;

#[cfg(test)]
mod discovery {
    mod integration;
}

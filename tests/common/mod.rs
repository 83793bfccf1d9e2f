pub mod regtest;

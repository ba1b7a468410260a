pub mod synchronization;

pub mod callbacks;

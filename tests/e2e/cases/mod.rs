mod batching;
mod lifecycle;
mod relay;
mod restart;

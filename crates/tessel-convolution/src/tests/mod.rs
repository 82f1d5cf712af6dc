//! Host reference and fixtures for convolution tests.


#[cfg(test)]
mod conv2d;

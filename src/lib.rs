pub mod cli;
pub mod hdmi;
pub mod registry;
pub mod sim;

#[cfg(test)]
mod test_utils;

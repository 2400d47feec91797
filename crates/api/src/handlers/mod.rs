pub mod simulations;

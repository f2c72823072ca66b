pub mod random_portfolios;

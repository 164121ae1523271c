mod binding;
mod integration;

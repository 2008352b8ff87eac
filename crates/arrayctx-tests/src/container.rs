//! Container protocol and registry tests

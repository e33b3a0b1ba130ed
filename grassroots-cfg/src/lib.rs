//  LIB.rs
//    by Lut99
//
//  Created:
//    22 Mar 2024, 09:34:50
//  Last edited:
//    21 Jun 2024, 17:01:12
//  Auto updated?
//    Yes
//
//  Description:
//!   The `grassroots-cfg` crate implements the loading of the
//!   `grassroots.config` file (and the per-service configuration files
//!   next to it) that define a server's identity, schema version,
//!   enabled services and external peers.
//

// Declare the modules
pub mod info;
pub mod server;

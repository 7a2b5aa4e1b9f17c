// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT repository publishing to remote object storage.

This crate maintains Debian APT repositories whose entire state lives
in a remote object store bucket. It knows how to:

* Read package metadata out of `.deb` files. (See [deb].)
* Parse and emit control files and `Packages` indices. (See [control]
  and [packages_index].)
* Parse, update, and emit `Release` manifests. (See [release].)
* Sign manifests with a PGP key, producing both `Release.gpg` and
  `InRelease`. (See [signing].)
* Serialize concurrent publishers through a best effort lock held in
  the store itself. (See [lock].)

[publisher::Publisher] composes these into a one shot publish
operation against an [store::ObjectStore] backend.
*/

pub mod control;
pub mod deb;
pub mod error;
pub mod lock;
pub mod packages_index;
pub mod publisher;
pub mod release;
pub mod signing;
pub mod store;

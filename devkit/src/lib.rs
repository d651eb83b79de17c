/*!
# ESXi Exporter DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests de l'exporter sans hyperviseur réel :
- Stub du endpoint vSphere `/sdk` (SOAP vim25) avec compteurs de session
- Builders des réponses XML (service content, summary, faults)
- Helpers de logging et d'adresses injoignables
*/

pub mod fixtures;
pub mod test_utils;
pub mod vsphere_stub;

pub use fixtures::StubHost;
pub use test_utils::{closed_address, init_test_logging};
pub use vsphere_stub::{StubStats, VsphereStub, VsphereStubBuilder};
